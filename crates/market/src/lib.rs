//! 行情抓取领域：分页抓取、规范化、限流预算、多市场编排与市场发现。

pub mod budget;
pub mod discovery;
pub mod normalize;
pub mod orchestrator;
pub mod series;
