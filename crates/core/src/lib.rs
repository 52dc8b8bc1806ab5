//! candlekeep 的领域核心：实体、错误、端口 (Trait) 与配置结构。
//! 所有适配器 crate 只依赖此处定义的抽象。

pub mod common;
pub mod config;
pub mod market;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod testing;
