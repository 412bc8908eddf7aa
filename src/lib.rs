//! flashtest - SPI NOR Flash 大文件耐久测试
//!
//! 在文件系统之上反复执行: 整片擦除 → 写满大文件 (每块立即回读) →
//! 用同一种子重放数据校验全卷 → 删除 → 下一轮。
//!
//! - `harness`: tick 驱动的测试状态机与数据生成器
//! - `fs`: Flash 设备抽象与文件系统门面 (littlefs2 适配在 feature `littlefs` 后)
//! - `config`: 运行时测试参数
//! - `error`: 致命错误类型
//! - `util`: 条件编译日志系统
//!
//! 核心逻辑不依赖目标板，在主机上即可测试。

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod fs;
pub mod harness;
pub mod util;

#[cfg(test)]
mod sim;

// ===== 重导出常用类型 =====
pub use config::{ConfigError, HarnessConfig};
pub use error::{HarnessError, IoFault};
pub use harness::{Clock, LogReporter, Reporter, RunStats, State, StressTest};

// ===== 版本信息 =====
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
