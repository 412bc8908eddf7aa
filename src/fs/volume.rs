//! 文件系统门面
//!
//! 耐久测试只依赖这里定义的 [`FileSystem`] trait；具体的文件系统引擎
//! (littlefs2，或测试用的内存实现) 在 trait 之后。

use core::fmt;
use core::fmt::Write as _;

use super::storage::{FlashDevice, StorageError};

/// 测试文件名的最大长度 ("t" + u32 十进制)
pub const FILE_NAME_LEN: usize = 12;

/// 测试文件名
pub type FileName = heapless::String<FILE_NAME_LEN>;

/// 文件系统错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsError {
    /// 存储层错误
    Storage(StorageError),
    /// 文件系统损坏
    Corrupt,
    /// 文件/目录不存在
    NotFound,
    /// 无效参数
    InvalidParam,
    /// 文件名过长
    NameTooLong,
    /// 空间不足
    NoSpace,
    /// 无效的文件句柄
    InvalidHandle,
    /// 文件系统未挂载
    NotMounted,
    /// 挂载失败
    MountFailed,
    /// 格式化失败
    FormatFailed,
    /// IO 错误
    IoError,
}

impl From<StorageError> for FsError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "Storage error: {}", e),
            Self::Corrupt => write!(f, "Filesystem corrupt"),
            Self::NotFound => write!(f, "Not found"),
            Self::InvalidParam => write!(f, "Invalid parameter"),
            Self::NameTooLong => write!(f, "Name too long"),
            Self::NoSpace => write!(f, "No space"),
            Self::InvalidHandle => write!(f, "Invalid handle"),
            Self::NotMounted => write!(f, "Not mounted"),
            Self::MountFailed => write!(f, "Mount failed"),
            Self::FormatFailed => write!(f, "Format failed"),
            Self::IoError => write!(f, "IO error"),
        }
    }
}

/// 文件打开选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// 读取权限
    pub read: bool,
    /// 写入权限
    pub write: bool,
    /// 如果不存在则创建
    pub create: bool,
}

impl OpenOptions {
    /// 创建新的打开选项
    pub const fn new() -> Self {
        Self {
            read: false,
            write: false,
            create: false,
        }
    }

    /// 设置读取权限
    pub const fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// 设置写入权限
    pub const fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// 设置创建标志
    pub const fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// 只读打开
    pub const fn read_only() -> Self {
        Self::new().read(true)
    }

    /// 读写打开，不存在则创建 (写入阶段)
    pub const fn read_write_create() -> Self {
        Self::new().read(true).write(true).create(true)
    }
}

/// 挂载在 Flash 设备上的文件系统
///
/// 句柄 `File` 由调用者持有，跨多次 tick 使用；所有操作都经由文件系统本身，
/// 这样实现可以自由选择句柄的表示方式。
pub trait FileSystem {
    /// 底层 Flash 设备
    type Device: FlashDevice;
    /// 打开的文件句柄
    type File;

    /// 底层设备 (复位、擦除等整卷操作)
    fn device(&mut self) -> &mut Self::Device;

    /// 挂载文件系统
    fn mount(&mut self) -> Result<(), FsError>;

    /// 卸载文件系统，未挂载时直接返回 `Ok`
    fn unmount(&mut self) -> Result<(), FsError>;

    /// 打开文件
    fn open(&mut self, path: &str, options: OpenOptions) -> Result<Self::File, FsError>;

    /// 从当前位置读取，返回实际读取的字节数
    fn read(&mut self, file: &mut Self::File, buffer: &mut [u8]) -> Result<usize, FsError>;

    /// 在当前位置写入，返回实际写入的字节数
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, FsError>;

    /// 把文件指针移到距文件开头 `offset` 字节处
    fn seek(&mut self, file: &mut Self::File, offset: u32) -> Result<(), FsError>;

    /// 关闭文件
    fn close(&mut self, file: Self::File) -> Result<(), FsError>;

    /// 删除文件
    fn remove(&mut self, path: &str) -> Result<(), FsError>;
}

/// 编号为 `index` 的测试文件名: `t<index>`
pub fn file_name(index: u32) -> FileName {
    let mut name = FileName::new();
    // "t" + 最多 10 位数字，容量足够
    let _ = write!(name, "t{}", index);
    name
}
