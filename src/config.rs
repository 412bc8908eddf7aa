//! 耐久测试配置
//!
//! 运行时结构体而不是编译期常量，同一固件可以按芯片容量调整参数。
//! 默认值对应 32 MiB (256 Mbit) 芯片: 96 个 256 KiB 文件，约占卷容量的 75%，
//! 剩余空间留给 littlefs 的元数据开销。

use core::fmt;

use crate::harness::pattern::DRAW_BYTES;

/// 默认测试文件数
pub const DEFAULT_FILE_COUNT: u32 = 96;

/// 默认每个文件的块数
pub const DEFAULT_BLOCKS_PER_FILE: u32 = 512;

/// 默认写入块大小 (不是扇区大小)
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// 默认两次测试之间的间隔 (毫秒)
pub const DEFAULT_TEST_PERIOD_MS: u64 = 120_000;

/// 默认卷大小 (32 MiB)
pub const DEFAULT_VOLUME_SIZE: u32 = 32 * 1024 * 1024;

/// 默认种子
pub const DEFAULT_SEED: u32 = 0;

/// 配置错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// 文件数为 0
    NoFiles,
    /// 每文件块数为 0
    NoBlocks,
    /// 块大小为 0 或不是 4 的倍数
    BadBlockSize(usize),
    /// 块大小超过缓冲区容量
    BlockTooLarge { block_size: usize, capacity: usize },
    /// 卷大小为 0
    NoVolume,
    /// 所有文件的总大小超过卷大小
    VolumeTooSmall { required: u64, available: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFiles => write!(f, "file count must be positive"),
            Self::NoBlocks => write!(f, "blocks per file must be positive"),
            Self::BadBlockSize(size) => {
                write!(f, "block size {} must be a positive multiple of {}", size, DRAW_BYTES)
            }
            Self::BlockTooLarge { block_size, capacity } => {
                write!(f, "block size {} exceeds buffer capacity {}", block_size, capacity)
            }
            Self::NoVolume => write!(f, "volume size must be positive"),
            Self::VolumeTooSmall { required, available } => {
                write!(f, "test needs {} bytes, volume has {}", required, available)
            }
        }
    }
}

/// 耐久测试参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// 每轮写入的文件数
    pub file_count: u32,
    /// 每个文件的块数
    pub blocks_per_file: u32,
    /// 每块字节数
    pub block_size: usize,
    /// 两次测试之间的最小间隔 (毫秒)，首次测试从状态机创建时算起
    pub test_period_ms: u64,
    /// 卷大小 (字节)，决定地址模式
    pub volume_size: u32,
    /// 数据生成器的固定种子
    pub seed: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessConfig {
    /// 默认配置
    pub const fn new() -> Self {
        Self {
            file_count: DEFAULT_FILE_COUNT,
            blocks_per_file: DEFAULT_BLOCKS_PER_FILE,
            block_size: DEFAULT_BLOCK_SIZE,
            test_period_ms: DEFAULT_TEST_PERIOD_MS,
            volume_size: DEFAULT_VOLUME_SIZE,
            seed: DEFAULT_SEED,
        }
    }

    /// 设置文件数
    pub const fn file_count(mut self, file_count: u32) -> Self {
        self.file_count = file_count;
        self
    }

    /// 设置每文件块数
    pub const fn blocks_per_file(mut self, blocks_per_file: u32) -> Self {
        self.blocks_per_file = blocks_per_file;
        self
    }

    /// 设置块大小
    pub const fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// 设置测试间隔
    pub const fn test_period_ms(mut self, test_period_ms: u64) -> Self {
        self.test_period_ms = test_period_ms;
        self
    }

    /// 设置卷大小
    pub const fn volume_size(mut self, volume_size: u32) -> Self {
        self.volume_size = volume_size;
        self
    }

    /// 设置种子
    pub const fn seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// 单个文件大小 (字节)
    pub const fn file_size(&self) -> u64 {
        self.blocks_per_file as u64 * self.block_size as u64
    }

    /// 每轮写入的总字节数
    pub const fn total_bytes(&self) -> u64 {
        self.file_count as u64 * self.file_size()
    }

    /// 检查参数
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_count == 0 {
            return Err(ConfigError::NoFiles);
        }
        if self.blocks_per_file == 0 {
            return Err(ConfigError::NoBlocks);
        }
        if self.block_size == 0 || self.block_size % DRAW_BYTES != 0 {
            return Err(ConfigError::BadBlockSize(self.block_size));
        }
        if self.volume_size == 0 {
            return Err(ConfigError::NoVolume);
        }
        if self.total_bytes() > self.volume_size as u64 {
            return Err(ConfigError::VolumeTooSmall {
                required: self.total_bytes(),
                available: self.volume_size,
            });
        }
        Ok(())
    }

    /// 检查参数，并确认块大小不超过缓冲区 `capacity`
    pub fn validate_for(&self, capacity: usize) -> Result<(), ConfigError> {
        self.validate()?;
        if self.block_size > capacity {
            return Err(ConfigError::BlockTooLarge {
                block_size: self.block_size,
                capacity,
            });
        }
        Ok(())
    }
}
