use candlekeep_core::config::DatabaseConfig;
use candlekeep_core::store::error::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// 根据数据库配置建立 PostgreSQL 连接池。
///
/// # Logic
/// 1. 按配置设置最大连接数与获取连接的超时。
/// 2. 立即建立连接以便在启动阶段暴露连接串错误。
///
/// # Arguments
/// * `config` - 数据库配置。
///
/// # Returns
/// * 连接池，失败时返回 `StoreError::InitError`。
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;
    info!(
        "Connected to PostgreSQL (max {} connections)",
        config.max_connections.max(1)
    );
    Ok(pool)
}

/// 与 `connect` 相同，但推迟到首次使用时才建立连接。
pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_lazy(&config.url)
        .map_err(|e| StoreError::InitError(e.to_string()))
}
