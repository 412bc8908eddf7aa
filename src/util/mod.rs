//! 通用工具

pub mod log;
