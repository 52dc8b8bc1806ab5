use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod time;

/// # Summary
/// K 线周期枚举，对应交易所支持的全部 resolution。
///
/// # Invariants
/// - 序列化与 `Display` 均使用交易所原生代码 (例如 `1HOUR`)，该字符串同时写入存储的 `resolution` 列。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolution {
    // 1日
    #[serde(rename = "1DAY", alias = "1d")]
    Day1,
    // 4小时
    #[serde(rename = "4HOURS", alias = "4h")]
    Hour4,
    // 1小时
    #[serde(rename = "1HOUR", alias = "1h")]
    Hour1,
    // 30分钟
    #[serde(rename = "30MINS", alias = "30m")]
    Min30,
    // 15分钟
    #[serde(rename = "15MINS", alias = "15m")]
    Min15,
    // 5分钟
    #[serde(rename = "5MINS", alias = "5m")]
    Min5,
    // 1分钟
    #[serde(rename = "1MIN", alias = "1m")]
    Min1,
}

impl Resolution {
    /// 全部周期，按时长从大到小排列。
    pub const ALL: [Resolution; 7] = [
        Resolution::Day1,
        Resolution::Hour4,
        Resolution::Hour1,
        Resolution::Min30,
        Resolution::Min15,
        Resolution::Min5,
        Resolution::Min1,
    ];

    /// # Summary
    /// 交易所接口使用的周期代码。
    pub fn as_code(&self) -> &'static str {
        match self {
            Resolution::Day1 => "1DAY",
            Resolution::Hour4 => "4HOURS",
            Resolution::Hour1 => "1HOUR",
            Resolution::Min30 => "30MINS",
            Resolution::Min15 => "15MINS",
            Resolution::Min5 => "5MINS",
            Resolution::Min1 => "1MIN",
        }
    }

    /// # Summary
    /// 单根 K 线覆盖的时长（秒）。
    pub fn seconds(&self) -> i64 {
        match self {
            Resolution::Day1 => 86_400,
            Resolution::Hour4 => 14_400,
            Resolution::Hour1 => 3_600,
            Resolution::Min30 => 1_800,
            Resolution::Min15 => 900,
            Resolution::Min5 => 300,
            Resolution::Min1 => 60,
        }
    }

    /// # Summary
    /// 单根 K 线覆盖的时长。
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        match normalized.as_str() {
            "1DAY" | "1D" => Ok(Resolution::Day1),
            "4HOURS" | "4H" => Ok(Resolution::Hour4),
            "1HOUR" | "1H" => Ok(Resolution::Hour1),
            "30MINS" | "30M" => Ok(Resolution::Min30),
            "15MINS" | "15M" => Ok(Resolution::Min15),
            "5MINS" | "5M" => Ok(Resolution::Min5),
            "1MIN" | "1M" => Ok(Resolution::Min1),
            _ => Err(format!("Unknown Resolution: {}", s)),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_code())
    }
}
