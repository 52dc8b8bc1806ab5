pub mod candles;
pub mod config;
pub mod copy;
