//! 时间来源

use embassy_time::Instant;

/// 单调时钟
///
/// 状态机不直接调用 `Instant::now()`，目标板用 embassy 时间驱动实现，
/// 主机测试用手动推进的时钟。
pub trait Clock {
    /// 当前时刻
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
