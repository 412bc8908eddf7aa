//! 大文件耐久测试
//!
//! - `pattern`: 确定性测试数据
//! - `state`: 状态与数据模型
//! - `machine`: tick 驱动的状态机
//! - `verify`: 逐字节比较
//! - `report`: 结果上报
//! - `clock`: 时间来源

pub mod clock;
pub mod machine;
pub mod pattern;
pub mod report;
pub mod state;
pub mod verify;

pub use clock::Clock;
pub use machine::{StressTest, DEFAULT_BUFFER_SIZE};
pub use pattern::PatternGenerator;
pub use report::{LogReporter, Mismatch, Pass, Phase, Reporter, RunStats, ShortRead};
pub use state::{BlockPosition, FileUnderTest, State, TestRun, VolumeState};
pub use verify::compare_block;
