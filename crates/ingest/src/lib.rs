pub mod error;
pub mod scheduler;
pub mod service;
