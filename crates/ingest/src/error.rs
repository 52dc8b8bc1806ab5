use candlekeep_core::market::error::MarketError;
use candlekeep_core::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 采集服务层的统一错误类型。
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Market error: {0}")]
    Market(#[from] MarketError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("No markets selected")]
    NoMarkets,
}
