//! Flash 存储抽象层
//!
//! 在 `embedded-storage` 的 `NorFlash` 之上补充整卷操作 (复位、探测、
//! 地址模式、整片擦除)，并提供按分区窗口访问任意 `NorFlash` 的适配器。

use core::fmt;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::log_debug;

/// 超过该容量 (16 MiB) 的器件必须使用 4 字节地址
pub const EXTENDED_ADDRESSING_THRESHOLD: u32 = 16 * 1024 * 1024;

/// 探测读取的最大长度
const CHECK_READ_LEN: usize = 256;

/// 存储操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// 读取失败
    ReadError,
    /// 写入失败
    WriteError,
    /// 擦除失败
    EraseError,
    /// 地址越界
    OutOfBounds,
    /// 对齐错误
    AlignmentError,
    /// 复位后未检测到芯片
    NotDetected,
    /// 地址模式切换失败
    AddressingError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadError => write!(f, "Flash read error"),
            Self::WriteError => write!(f, "Flash write error"),
            Self::EraseError => write!(f, "Flash erase error"),
            Self::OutOfBounds => write!(f, "Address out of bounds"),
            Self::AlignmentError => write!(f, "Address alignment error"),
            Self::NotDetected => write!(f, "Flash chip not detected"),
            Self::AddressingError => write!(f, "Addressing mode switch failed"),
        }
    }
}

impl NorFlashError for StorageError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Self::AlignmentError => NorFlashErrorKind::NotAligned,
            _ => NorFlashErrorKind::Other,
        }
    }
}

/// 将底层 `NorFlash` 错误归类为 [`StorageError`]
///
/// 对齐与越界保持原样，其余归入 `fallback` (对应具体操作)。
pub fn map_nor_error<E: NorFlashError>(error: E, fallback: StorageError) -> StorageError {
    match error.kind() {
        NorFlashErrorKind::NotAligned => StorageError::AlignmentError,
        NorFlashErrorKind::OutOfBounds => StorageError::OutOfBounds,
        _ => fallback,
    }
}

/// 容量是否要求 4 字节地址模式
pub const fn needs_extended_addressing(volume_size: u32) -> bool {
    volume_size > EXTENDED_ADDRESSING_THRESHOLD
}

/// 整卷级别的 Flash 设备操作
///
/// 读/写/扇区擦除沿用 `NorFlash`，这里只补充耐久测试在挂载前需要的操作。
pub trait FlashDevice: NorFlash {
    /// 向芯片发送复位
    fn reset(&mut self) -> Result<(), StorageError>;

    /// 复位后芯片是否可用
    fn is_valid(&mut self) -> bool;

    /// 切换 3 字节 / 4 字节地址模式
    fn set_extended_addressing(&mut self, enabled: bool) -> Result<(), StorageError>;

    /// 当前是否为 4 字节地址模式
    fn extended_addressing(&self) -> bool;

    /// 擦除整个卷
    fn chip_erase(&mut self) -> Result<(), StorageError> {
        let end = self.capacity() as u32;
        self.erase(0, end)
            .map_err(|e| map_nor_error(e, StorageError::EraseError))
    }
}

/// Flash 分区窗口配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    /// 分区起始偏移
    pub partition_offset: u32,
    /// 分区大小
    pub partition_size: u32,
}

impl FlashConfig {
    /// 指定偏移和大小的分区
    pub const fn new(partition_offset: u32, partition_size: u32) -> Self {
        Self {
            partition_offset,
            partition_size,
        }
    }

    /// 分区结束地址 (不含)，超出 32 位地址空间时为 `None`
    pub const fn end(&self) -> Option<u32> {
        self.partition_offset.checked_add(self.partition_size)
    }
}

/// 基于分区窗口的 `NorFlash` 设备
///
/// 把窗口内偏移翻译为底层 Flash 的绝对地址，越界访问直接拒绝，
/// 因此整片擦除只会擦掉窗口本身。
pub struct NorFlashDevice<F> {
    flash: F,
    config: FlashConfig,
    extended_addressing: bool,
}

impl<F: NorFlash> NorFlashDevice<F> {
    /// 在 `flash` 上创建分区窗口
    pub fn new(flash: F, config: FlashConfig) -> Result<Self, StorageError> {
        match config.end() {
            Some(end) if config.partition_size > 0 && end as usize <= flash.capacity() => {}
            _ => return Err(StorageError::OutOfBounds),
        }

        let erase_size = F::ERASE_SIZE as u32;
        if config.partition_offset % erase_size != 0 || config.partition_size % erase_size != 0 {
            return Err(StorageError::AlignmentError);
        }

        Ok(Self {
            flash,
            config,
            extended_addressing: false,
        })
    }

    /// 覆盖整个 Flash 的窗口
    pub fn whole(flash: F) -> Result<Self, StorageError> {
        let size = flash.capacity() as u32;
        Self::new(flash, FlashConfig::new(0, size))
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &F {
        &self.flash
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> F {
        self.flash
    }

    /// 将窗口内偏移转换为绝对地址
    fn translate(&self, offset: u32, len: usize) -> Result<u32, StorageError> {
        let end = offset as u64 + len as u64;
        if end > self.config.partition_size as u64 {
            return Err(StorageError::OutOfBounds);
        }
        Ok(self.config.partition_offset + offset)
    }
}

impl<F: NorFlash> ErrorType for NorFlashDevice<F> {
    type Error = StorageError;
}

impl<F: NorFlash> ReadNorFlash for NorFlashDevice<F> {
    const READ_SIZE: usize = F::READ_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let address = self.translate(offset, bytes.len())?;
        self.flash
            .read(address, bytes)
            .map_err(|e| map_nor_error(e, StorageError::ReadError))
    }

    fn capacity(&self) -> usize {
        self.config.partition_size as usize
    }
}

impl<F: NorFlash> NorFlash for NorFlashDevice<F> {
    const WRITE_SIZE: usize = F::WRITE_SIZE;
    const ERASE_SIZE: usize = F::ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to {
            return Err(StorageError::OutOfBounds);
        }
        let start = self.translate(from, (to - from) as usize)?;
        let end = start + (to - from);
        self.flash
            .erase(start, end)
            .map_err(|e| map_nor_error(e, StorageError::EraseError))
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let address = self.translate(offset, bytes.len())?;
        self.flash
            .write(address, bytes)
            .map_err(|e| map_nor_error(e, StorageError::WriteError))
    }
}

impl<F: NorFlash> FlashDevice for NorFlashDevice<F> {
    fn reset(&mut self) -> Result<(), StorageError> {
        // 内存映射的 NorFlash 没有复位命令，复位只恢复默认地址模式
        self.extended_addressing = false;
        Ok(())
    }

    fn is_valid(&mut self) -> bool {
        let len = F::READ_SIZE.max(1);
        if len > CHECK_READ_LEN {
            return self.config.partition_size > 0;
        }

        let mut sample = [0u8; CHECK_READ_LEN];
        let ok = self.read(0, &mut sample[..len]).is_ok();
        log_debug!("flash check read at 0x{:X}: {}", self.config.partition_offset, ok);
        ok
    }

    fn set_extended_addressing(&mut self, enabled: bool) -> Result<(), StorageError> {
        self.extended_addressing = enabled;
        Ok(())
    }

    fn extended_addressing(&self) -> bool {
        self.extended_addressing
    }
}
