//! 耐久测试的致命错误
//!
//! 设备、挂载和文件 IO 错误都会让状态机进入吸收态 `Failure`；
//! 数据不一致不是错误，只作为 [`Mismatch`](crate::harness::Mismatch) 上报。

use core::fmt;

use crate::fs::{FsError, StorageError};

/// 致命的文件 IO 故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoFault {
    /// 打开文件失败
    Open { file: u32, error: FsError },
    /// 写入返回错误
    Write { file: u32, offset: u32, error: FsError },
    /// 写入字节数不足
    ShortWrite {
        file: u32,
        offset: u32,
        written: usize,
        expected: usize,
    },
    /// 定位失败
    Seek { file: u32, offset: u32, error: FsError },
    /// 读取返回错误 (设备级，读取不足不算)
    Read { file: u32, offset: u32, error: FsError },
}

impl fmt::Display for IoFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { file, error } => write!(f, "open t{} failed: {}", file, error),
            Self::Write { file, offset, error } => {
                write!(f, "write t{} at {} failed: {}", file, offset, error)
            }
            Self::ShortWrite {
                file,
                offset,
                written,
                expected,
            } => write!(
                f,
                "write failure {} != {} on t{} at offset {}",
                written, expected, file, offset
            ),
            Self::Seek { file, offset, error } => {
                write!(f, "seek t{} to {} failed: {}", file, offset, error)
            }
            Self::Read { file, offset, error } => {
                write!(f, "read t{} at {} failed: {}", file, offset, error)
            }
        }
    }
}

/// 致命错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HarnessError {
    /// 复位后芯片无效，或整卷操作失败
    Device(StorageError),
    /// 挂载/卸载失败
    Mount(FsError),
    /// 文件 IO 失败
    Io(IoFault),
}

impl From<IoFault> for HarnessError {
    fn from(fault: IoFault) -> Self {
        Self::Io(fault)
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device error: {}", e),
            Self::Mount(e) => write!(f, "mount error: {}", e),
            Self::Io(e) => write!(f, "io error: {}", e),
        }
    }
}
