//! 固件任务
//!
//! - `stress`: 驱动耐久测试状态机，并汇总每轮结果

pub mod stress;
