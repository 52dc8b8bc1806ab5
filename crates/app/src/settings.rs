use candlekeep_core::config::AppConfig;
use config::{Config, ConfigError, Environment, File, FileFormat};

/// 未指定时使用的配置文件路径。
pub const DEFAULT_CONFIG_PATH: &str = "config/candlekeep.toml";

/// 环境变量前缀，层级以 `__` 分隔，例如 `CANDLEKEEP_DATABASE__URL`。
pub const ENV_PREFIX: &str = "CANDLEKEEP";

/// 读取 `CANDLEKEEP_` 前缀环境变量的配置源。
///
/// 前缀与键之间以单个 `_` 分隔，层级之间以 `__` 分隔，`ingest.markets` 以逗号分隔。
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("ingest.markets")
}

/// 加载应用配置。
///
/// # Logic
/// 1. 以 `AppConfig::default()` 作为最底层。
/// 2. 叠加 TOML 配置文件（不存在时忽略）。
/// 3. 叠加进程环境变量。
///
/// # Arguments
/// * `path` - 配置文件路径。
///
/// # Returns
/// * 合并后的配置，格式错误时返回 `ConfigError`。
pub fn load(path: &str) -> Result<AppConfig, ConfigError> {
    load_with(path, environment())
}

/// 与 `load` 相同，但使用给定的环境变量源。
pub fn load_with(path: &str, env: Environment) -> Result<AppConfig, ConfigError> {
    Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(File::new(path, FileFormat::Toml).required(false))
        .add_source(env)
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candlekeep_core::common::Resolution;
    use config::Map;
    use std::io::Write;

    #[test]
    fn test_load_defaults_without_file() {
        let config = load("does/not/exist.toml").unwrap();
        assert_eq!(config.ingest.table_name, "dydx_candles");
        assert_eq!(config.exchange.page_limit, 100);
        assert_eq!(config.ingest.top_markets, None);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[ingest]
table_name = "candles_15m"
resolution = "15m"
markets = ["BTC-USD", "ETH-USD"]
top_markets = 10

[database]
url = "postgres://ingest@db:5432/market"
"#
        )
        .unwrap();

        let config = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.ingest.table_name, "candles_15m");
        assert_eq!(config.ingest.resolution, Resolution::Min15);
        assert_eq!(config.ingest.markets, vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(config.ingest.top_markets, Some(10));
        assert_eq!(config.database.url, "postgres://ingest@db:5432/market");
        // 未覆盖的字段保持默认
        assert_eq!(config.ingest.poll_interval_secs, 3600);
        assert_eq!(config.database.max_connections, 4);
    }

    #[test]
    fn test_file_without_markets_key_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\ntable_name = \"candles_1d\"").unwrap();

        let config = load_with(file.path().to_str().unwrap(), environment().source(Some(Map::new())))
            .unwrap();
        assert_eq!(config.ingest.table_name, "candles_1d");
        assert!(config.ingest.markets.is_empty());
        assert_eq!(config.ingest.top_markets, None);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\ntable_name = \"from_file\"").unwrap();

        let mut vars = Map::new();
        vars.insert("CANDLEKEEP_INGEST__TABLE_NAME".to_string(), "from_env".to_string());
        vars.insert(
            "CANDLEKEEP_DATABASE__URL".to_string(),
            "postgres://ops@prod:5432/candles".to_string(),
        );
        vars.insert("CANDLEKEEP_INGEST__MARKETS".to_string(), "BTC-USD,ETH-USD".to_string());
        vars.insert("CANDLEKEEP_INGEST__POLL_INTERVAL_SECS".to_string(), "900".to_string());

        let config =
            load_with(file.path().to_str().unwrap(), environment().source(Some(vars))).unwrap();
        assert_eq!(config.ingest.table_name, "from_env");
        assert_eq!(config.database.url, "postgres://ops@prod:5432/candles");
        assert_eq!(config.ingest.markets, vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(config.ingest.poll_interval_secs, 900);
    }
}
