//! 文件系统模块
//!
//! - `storage`: Flash 设备抽象 (基于 embedded-storage 的 `NorFlash`)
//! - `volume`: 耐久测试使用的文件系统门面
//! - `littlefs`: 基于 littlefs2 的门面实现 (feature = "littlefs")

#[cfg(feature = "littlefs")]
pub mod littlefs;
pub mod storage;
pub mod volume;

#[cfg(feature = "littlefs")]
pub use littlefs::{LfsFile, LfsStorage, LittleFsVolume};
pub use storage::{FlashConfig, FlashDevice, NorFlashDevice, StorageError};
pub use volume::{file_name, FileName, FileSystem, FsError, OpenOptions};
