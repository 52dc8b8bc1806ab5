//! 交易所行情适配器。

pub mod dydx;
