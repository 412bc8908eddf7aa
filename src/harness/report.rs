//! 测试结果上报
//!
//! 状态机把阶段计时、数据不一致和失败交给 [`Reporter`]；
//! 默认的 [`LogReporter`] 写入日志系统。

use core::fmt;

use embassy_time::Duration;

use super::state::BlockPosition;
use crate::error::HarnessError;
use crate::{log_error, log_info, log_warn};

/// 计时的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// 整片擦除
    ChipErase,
    /// 写入全部文件
    WritePass,
    /// 写入单个文件
    WriteFile(u32),
    /// 校验全部文件
    VerifyPass,
    /// 校验单个文件
    VerifyFile(u32),
    /// 删除全部文件
    DeleteFiles,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChipErase => write!(f, "chipErase"),
            Self::WritePass => write!(f, "write pass"),
            Self::WriteFile(n) => write!(f, "writing file {}", n),
            Self::VerifyPass => write!(f, "verify pass"),
            Self::VerifyFile(n) => write!(f, "verifying file {}", n),
            Self::DeleteFiles => write!(f, "deleting all files"),
        }
    }
}

/// 比较发生在哪一遍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pass {
    /// 写入后立即回读
    Readback,
    /// 全卷写完后的校验
    Verify,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Readback => write!(f, "readback"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

/// 单字节不一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mismatch {
    /// 发现于哪一遍
    pub pass: Pass,
    /// 所在块
    pub position: BlockPosition,
    /// 块内字节偏移
    pub byte_offset: usize,
    /// 期望值
    pub expected: u8,
    /// 实际值
    pub actual: u8,
}

/// 读取的字节数少于请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShortRead {
    /// 发现于哪一遍
    pub pass: Pass,
    /// 所在块
    pub position: BlockPosition,
    /// 请求的字节数
    pub requested: usize,
    /// 实际读到的字节数
    pub read: usize,
}

/// 一轮测试的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunStats {
    /// 轮次
    pub cycle: u32,
    /// 写完的文件数
    pub files_written: u32,
    /// 写入的块数
    pub blocks_written: u64,
    /// 写入的字节数
    pub bytes_written: u64,
    /// 校验的块数
    pub blocks_verified: u64,
    /// 回读不一致的字节数 (含读取不足)
    pub readback_mismatches: u64,
    /// 校验不一致的字节数 (含读取不足)
    pub verify_mismatches: u64,
}

impl RunStats {
    /// 第 `cycle` 轮的空统计
    pub const fn new(cycle: u32) -> Self {
        Self {
            cycle,
            files_written: 0,
            blocks_written: 0,
            bytes_written: 0,
            blocks_verified: 0,
            readback_mismatches: 0,
            verify_mismatches: 0,
        }
    }

    /// 全部不一致数
    pub const fn mismatches(&self) -> u64 {
        self.readback_mismatches + self.verify_mismatches
    }

    pub(crate) fn record_mismatches(&mut self, pass: Pass, count: u32) {
        match pass {
            Pass::Readback => self.readback_mismatches += count as u64,
            Pass::Verify => self.verify_mismatches += count as u64,
        }
    }
}

/// 测试结果的接收方
pub trait Reporter {
    /// 阶段开始
    fn phase_started(&mut self, phase: Phase);

    /// 阶段结束
    fn phase_finished(&mut self, phase: Phase, elapsed: Duration);

    /// 单字节不一致 (不终止测试)
    fn mismatch(&mut self, mismatch: &Mismatch);

    /// 读取不足 (不终止测试)
    fn short_read(&mut self, short: &ShortRead);

    /// 一轮写入、校验、删除完成
    fn cycle_completed(&mut self, stats: &RunStats);

    /// 进入失败状态，每次运行只调用一次
    fn failure(&mut self, error: &HarnessError);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn phase_started(&mut self, phase: Phase) {
        (**self).phase_started(phase)
    }

    fn phase_finished(&mut self, phase: Phase, elapsed: Duration) {
        (**self).phase_finished(phase, elapsed)
    }

    fn mismatch(&mut self, mismatch: &Mismatch) {
        (**self).mismatch(mismatch)
    }

    fn short_read(&mut self, short: &ShortRead) {
        (**self).short_read(short)
    }

    fn cycle_completed(&mut self, stats: &RunStats) {
        (**self).cycle_completed(stats)
    }

    fn failure(&mut self, error: &HarnessError) {
        (**self).failure(error)
    }
}

/// 写入日志的上报器
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn phase_started(&mut self, phase: Phase) {
        log_info!("starting {}", phase);
    }

    fn phase_finished(&mut self, phase: Phase, elapsed: Duration) {
        log_info!("finished {}: {} ms", phase, elapsed.as_millis());
    }

    fn mismatch(&mut self, m: &Mismatch) {
        log_warn!(
            "mismatched data ({}) file={} blockNum={} ii={} expected={:02x} got={:02x}",
            m.pass,
            m.position.file,
            m.position.block,
            m.byte_offset,
            m.expected,
            m.actual
        );
    }

    fn short_read(&mut self, s: &ShortRead) {
        log_warn!(
            "short read ({}) file={} blockNum={} got {} of {} bytes",
            s.pass,
            s.position.file,
            s.position.block,
            s.read,
            s.requested
        );
    }

    fn cycle_completed(&mut self, stats: &RunStats) {
        log_info!(
            "cycle {} completed: {} files, {} bytes written, {} blocks verified, {} readback / {} verify mismatches",
            stats.cycle,
            stats.files_written,
            stats.bytes_written,
            stats.blocks_verified,
            stats.readback_mismatches,
            stats.verify_mismatches
        );
    }

    fn failure(&mut self, error: &HarnessError) {
        log_error!("entered failure state, tests stopped: {}", error);
    }
}
