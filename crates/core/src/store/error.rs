use thiserror::Error;

/// # Summary
/// 存储层错误枚举，按 upsert 流程的阶段区分失败位置。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 任一阶段失败都意味着整批数据未提交。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库操作失败
    #[error("Database error: {0}")]
    Database(String),
    /// 目标表结构不可用（不存在或包含未知列）
    #[error("Schema error: {0}")]
    Schema(String),
    /// 临时暂存表创建失败
    #[error("Staging error: {0}")]
    Staging(String),
    /// 批量传输 (COPY) 失败
    #[error("Transfer error: {0}")]
    Transfer(String),
    /// 合并到目标表失败
    #[error("Merge error: {0}")]
    Merge(String),
    /// 非法的表名
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
}
