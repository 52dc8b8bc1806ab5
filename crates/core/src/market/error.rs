use thiserror::Error;

/// # Summary
/// 交易所数据域错误枚举，区分传输失败、交易所拒绝与数据解析问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 限流 (HTTP 429) 必须以 `rate_limited = true` 的 `Exchange` 变体表达。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    // 网络层错误，包含底层 HTTP 客户端错误信息
    #[error("Transport error: {0}")]
    Transport(String),
    // 交易所返回 4xx/5xx
    #[error("Exchange error (HTTP {status}, rate limited: {rate_limited}): {message}")]
    Exchange {
        status: u16,
        rate_limited: bool,
        message: String,
    },
    // 数据解析错误，如 JSON 格式不匹配或数值非法
    #[error("Parse error: {0}")]
    Parse(String),
}

impl MarketError {
    /// 根据 HTTP 状态码构造交易所错误，429 视为限流。
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        MarketError::Exchange {
            status,
            rate_limited: status == 429,
            message: message.into(),
        }
    }

    /// 是否为交易所短窗口限流。
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            MarketError::Exchange {
                rate_limited: true,
                ..
            }
        )
    }
}
