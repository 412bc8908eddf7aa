//! LittleFS 文件系统封装
//!
//! 通过 littlefs2 在 [`FlashDevice`] 上挂载文件系统，并实现 [`FileSystem`] 门面。
//!
//! littlefs2 的文件只能在闭包内借用，无法跨 tick 保持打开状态，所以句柄记录路径、
//! 位置和一个 Flash 块大小的缓冲区:
//! - 写入先进入缓冲区，文件偏移到达 4 KiB 边界 (或关闭) 时一次写入并提交，
//!   每 4 KiB 只重新打开、提交一次文件
//! - 读取每次从 Flash 载入 4 KiB，后续读取命中缓冲区
//!
//! 仍在写缓冲区中的数据由缓冲区直接读回；提交之后的读取都来自 Flash。

use littlefs2::consts;
use littlefs2::driver::Storage;
use littlefs2::fs::{Filesystem, OpenOptions as LfsOpenOptions};
use littlefs2::io::{self as lfs_io, Read, Seek, Write};
use littlefs2::path::Path;

use super::storage::FlashDevice;
use super::volume::{FileSystem, FsError, OpenOptions};
use crate::{log_debug, log_info};

/// littlefs 逻辑块大小 (与 Flash 扇区一致)
pub const LFS_BLOCK_SIZE: usize = 4096;

/// 路径缓冲区长度 (含结尾 NUL)
const PATH_LEN: usize = 32;

type PathBuffer = heapless::String<PATH_LEN>;

impl From<lfs_io::Error> for FsError {
    fn from(e: lfs_io::Error) -> Self {
        match e {
            lfs_io::Error::NoSuchEntry => Self::NotFound,
            lfs_io::Error::NoSpace => Self::NoSpace,
            lfs_io::Error::Corruption => Self::Corrupt,
            lfs_io::Error::FilenameTooLong => Self::NameTooLong,
            lfs_io::Error::BadFileDescriptor => Self::InvalidHandle,
            lfs_io::Error::Invalid => Self::InvalidParam,
            _ => Self::IoError,
        }
    }
}

/// littlefs2 块设备适配器
///
/// `BLOCKS` 为分区包含的 4 KiB 块数，littlefs2 要求在编译期确定。
pub struct LfsStorage<D, const BLOCKS: usize> {
    device: D,
}

impl<D: FlashDevice, const BLOCKS: usize> LfsStorage<D, BLOCKS> {
    /// 创建适配器
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// 获取内部设备可变引用
    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: FlashDevice, const BLOCKS: usize> Storage for LfsStorage<D, BLOCKS> {
    const READ_SIZE: usize = 256;
    const WRITE_SIZE: usize = 256;
    const BLOCK_SIZE: usize = LFS_BLOCK_SIZE;
    const BLOCK_COUNT: usize = BLOCKS;
    const BLOCK_CYCLES: isize = 500;

    type CACHE_SIZE = consts::U256;
    type LOOKAHEAD_SIZE = consts::U4;

    fn read(&mut self, off: usize, buf: &mut [u8]) -> lfs_io::Result<usize> {
        self.device
            .read(off as u32, buf)
            .map_err(|_| lfs_io::Error::Io)?;
        Ok(buf.len())
    }

    fn write(&mut self, off: usize, data: &[u8]) -> lfs_io::Result<usize> {
        self.device
            .write(off as u32, data)
            .map_err(|_| lfs_io::Error::Io)?;
        Ok(data.len())
    }

    fn erase(&mut self, off: usize, len: usize) -> lfs_io::Result<usize> {
        self.device
            .erase(off as u32, (off + len) as u32)
            .map_err(|_| lfs_io::Error::Io)?;
        Ok(len)
    }
}

/// 句柄缓冲区
///
/// `dirty` 时是尚未提交的连续写入，否则是从 Flash 载入的读缓存。
#[derive(Debug)]
struct Window {
    /// 第一个字节在文件中的偏移
    start: u32,
    len: usize,
    dirty: bool,
    data: [u8; LFS_BLOCK_SIZE],
}

impl Window {
    const fn new() -> Self {
        Self {
            start: 0,
            len: 0,
            dirty: false,
            data: [0; LFS_BLOCK_SIZE],
        }
    }

    fn end(&self) -> u64 {
        self.start as u64 + self.len as u64
    }

    /// `[position, position + len)` 完全落在缓冲区内
    fn contains(&self, position: u32, len: usize) -> bool {
        self.len > 0 && position >= self.start && position as u64 + len as u64 <= self.end()
    }

    /// 写入能否接在未提交数据之后
    fn accepts(&self, position: u32, len: usize) -> bool {
        self.dirty && position as u64 == self.end() && self.len + len <= LFS_BLOCK_SIZE
    }

    /// 写缓冲区到达文件的 4 KiB 边界或已满
    fn ready_to_commit(&self) -> bool {
        self.dirty && (self.len == LFS_BLOCK_SIZE || self.end() % LFS_BLOCK_SIZE as u64 == 0)
    }

    fn invalidate(&mut self) {
        self.len = 0;
        self.dirty = false;
    }
}

/// 文件句柄: 路径 + 当前位置 + 缓冲区
#[derive(Debug)]
pub struct LfsFile {
    path: PathBuffer,
    position: u32,
    options: OpenOptions,
    window: Window,
}

fn lfs_path(buffer: &PathBuffer) -> Result<&Path, FsError> {
    Path::from_bytes_with_nul(buffer.as_bytes()).map_err(|_| FsError::InvalidParam)
}

fn nul_terminated(path: &str) -> Result<PathBuffer, FsError> {
    let mut buffer = PathBuffer::new();
    buffer.push_str(path).map_err(|_| FsError::NameTooLong)?;
    buffer.push('\0').map_err(|_| FsError::NameTooLong)?;
    Ok(buffer)
}

fn apply(options: OpenOptions, o: &mut LfsOpenOptions) -> &LfsOpenOptions {
    o.read(options.read)
        .write(options.write)
        .create(options.create)
}

/// 挂载在 Flash 设备上的 LittleFS 卷
pub struct LittleFsVolume<D, const BLOCKS: usize> {
    storage: LfsStorage<D, BLOCKS>,
    mounted: bool,
}

impl<D: FlashDevice, const BLOCKS: usize> LittleFsVolume<D, BLOCKS> {
    /// 创建卷 (未挂载)
    pub fn new(device: D) -> Self {
        Self {
            storage: LfsStorage::new(device),
            mounted: false,
        }
    }

    /// 卷的总字节数
    pub const fn total_bytes() -> usize {
        BLOCKS * LFS_BLOCK_SIZE
    }

    fn with_mounted<R>(
        &mut self,
        f: impl FnOnce(&Filesystem<'_, LfsStorage<D, BLOCKS>>) -> lfs_io::Result<R>,
    ) -> Result<R, FsError> {
        if !self.mounted {
            return Err(FsError::NotMounted);
        }
        Filesystem::mount_and_then(&mut self.storage, f).map_err(FsError::from)
    }

    /// 把未提交的写入写入 Flash 并提交文件
    fn commit(&mut self, file: &mut LfsFile) -> Result<(), FsError> {
        if !file.window.dirty || file.window.len == 0 {
            file.window.dirty = false;
            return Ok(());
        }

        let path = lfs_path(&file.path)?;
        let start = file.window.start;
        let pending = &file.window.data[..file.window.len];
        let written = self.with_mounted(|fs| {
            fs.open_file_with_options_and_then(|o| o.read(true).write(true), path, |f| {
                f.seek(lfs_io::SeekFrom::Start(start))?;
                f.write(pending)
            })
        })?;

        let expected = file.window.len;
        // 之后的读取 (包括立即回读) 都从 Flash 重新载入
        file.window.invalidate();
        if written != expected {
            return Err(FsError::IoError);
        }
        log_debug!("committed {} bytes at {}", written, start);
        Ok(())
    }

    /// 从 Flash 读取 `[position, position + buffer.len())`
    fn read_through(
        &mut self,
        path: &PathBuffer,
        position: u32,
        buffer: &mut [u8],
    ) -> Result<usize, FsError> {
        let path = lfs_path(path)?;
        self.with_mounted(|fs| {
            fs.open_file_with_options_and_then(|o| o.read(true), path, |f| {
                f.seek(lfs_io::SeekFrom::Start(position))?;
                f.read(buffer)
            })
        })
    }
}

impl<D: FlashDevice, const BLOCKS: usize> FileSystem for LittleFsVolume<D, BLOCKS> {
    type Device = D;
    type File = LfsFile;

    fn device(&mut self) -> &mut D {
        self.storage.inner_mut()
    }

    fn mount(&mut self) -> Result<(), FsError> {
        if self.mounted {
            return Ok(());
        }

        if !Filesystem::is_mountable(&mut self.storage) {
            log_info!("no littlefs on volume, formatting {} blocks", BLOCKS);
            Filesystem::format(&mut self.storage).map_err(|_| FsError::FormatFailed)?;
        }

        Filesystem::mount_and_then(&mut self.storage, |_| Ok(()))
            .map_err(|_| FsError::MountFailed)?;

        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), FsError> {
        // 每次操作结束时 littlefs2 已经卸载，这里只更新状态
        self.mounted = false;
        Ok(())
    }

    fn open(&mut self, path: &str, options: OpenOptions) -> Result<LfsFile, FsError> {
        let file = LfsFile {
            path: nul_terminated(path)?,
            position: 0,
            options,
            window: Window::new(),
        };

        // 打开一次以便立即发现不存在或创建失败
        let target = lfs_path(&file.path)?;
        self.with_mounted(|fs| {
            fs.open_file_with_options_and_then(|o| apply(options, o), target, |_| Ok(()))
        })?;

        log_debug!("opened {}", path);
        Ok(file)
    }

    fn read(&mut self, file: &mut LfsFile, buffer: &mut [u8]) -> Result<usize, FsError> {
        if !file.options.read {
            return Err(FsError::InvalidParam);
        }

        let position = file.position;
        if !file.window.contains(position, buffer.len()) {
            self.commit(file)?;

            if buffer.len() > LFS_BLOCK_SIZE {
                let read = self.read_through(&file.path, position, buffer)?;
                file.position += read as u32;
                return Ok(read);
            }

            let loaded = self.read_through(&file.path, position, &mut file.window.data)?;
            file.window.start = position;
            file.window.len = loaded;
        }

        let from = (position - file.window.start) as usize;
        let read = buffer.len().min(file.window.len - from);
        buffer[..read].copy_from_slice(&file.window.data[from..from + read]);
        file.position += read as u32;
        Ok(read)
    }

    fn write(&mut self, file: &mut LfsFile, data: &[u8]) -> Result<usize, FsError> {
        if !file.options.write {
            return Err(FsError::InvalidParam);
        }

        let position = file.position;
        if !file.window.accepts(position, data.len()) {
            self.commit(file)?;
            file.window.start = position;
            file.window.len = 0;
            file.window.dirty = true;
        }

        if data.len() > LFS_BLOCK_SIZE {
            // 超过一个块的写入直接提交
            let path = lfs_path(&file.path)?;
            let written = self.with_mounted(|fs| {
                fs.open_file_with_options_and_then(|o| o.read(true).write(true), path, |f| {
                    f.seek(lfs_io::SeekFrom::Start(position))?;
                    f.write(data)
                })
            })?;
            file.window.invalidate();
            file.position += written as u32;
            return Ok(written);
        }

        let at = file.window.len;
        file.window.data[at..at + data.len()].copy_from_slice(data);
        file.window.len += data.len();
        file.position += data.len() as u32;

        if file.window.ready_to_commit() {
            self.commit(file)?;
        }
        Ok(data.len())
    }

    fn seek(&mut self, file: &mut LfsFile, offset: u32) -> Result<(), FsError> {
        file.position = offset;
        Ok(())
    }

    fn close(&mut self, mut file: LfsFile) -> Result<(), FsError> {
        self.commit(&mut file)
    }

    fn remove(&mut self, path: &str) -> Result<(), FsError> {
        let buffer = nul_terminated(path)?;
        let target = lfs_path(&buffer)?;
        self.with_mounted(|fs| fs.remove(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::fs::storage::NorFlashDevice;
    use crate::fs::volume::file_name;
    use crate::harness::{PatternGenerator, State, StressTest};
    use crate::sim::{ManualClock, RamFlash, RecordingReporter};

    type Volume = LittleFsVolume<NorFlashDevice<RamFlash>, 32>;

    fn volume() -> Volume {
        let device = NorFlashDevice::whole(RamFlash::new(32 * LFS_BLOCK_SIZE)).unwrap();
        LittleFsVolume::new(device)
    }

    fn read_block(fs: &mut Volume, name: &str, offset: u32) -> [u8; 512] {
        let mut file = fs.open(name, OpenOptions::read_only()).unwrap();
        fs.seek(&mut file, offset).unwrap();
        let mut block = [0u8; 512];
        assert_eq!(fs.read(&mut file, &mut block).unwrap(), 512);
        fs.close(file).unwrap();
        block
    }

    #[test]
    fn test_requires_mount() {
        let mut fs = volume();
        assert_eq!(fs.open("t1", OpenOptions::read_only()).err(), Some(FsError::NotMounted));
    }

    #[test]
    fn test_mount_formats_erased_volume() {
        let mut fs = volume();
        fs.device().chip_erase().unwrap();
        fs.mount().unwrap();
        assert!(fs.open("t1", OpenOptions::read_write_create()).is_ok());
        assert_eq!(Volume::total_bytes(), 32 * 4096);
    }

    #[test]
    fn test_write_seek_read_remove() {
        let mut fs = volume();
        fs.mount().unwrap();

        let data: [u8; 512] = core::array::from_fn(|i| i as u8);
        let mut file = fs.open("t1", OpenOptions::read_write_create()).unwrap();
        assert_eq!(fs.write(&mut file, &data).unwrap(), 512);
        assert_eq!(fs.write(&mut file, &data).unwrap(), 512);
        fs.seek(&mut file, 512).unwrap();

        let mut back = [0u8; 512];
        assert_eq!(fs.read(&mut file, &mut back).unwrap(), 512);
        assert_eq!(back, data);
        fs.close(file).unwrap();

        // 关闭后数据已在 Flash 上
        assert_eq!(read_block(&mut fs, "t1", 512), data);

        fs.remove("t1").unwrap();
        assert_eq!(fs.open("t1", OpenOptions::read_only()).err(), Some(FsError::NotFound));
    }

    #[test]
    fn test_short_read_at_end_of_file() {
        let mut fs = volume();
        fs.mount().unwrap();

        let mut file = fs.open("t1", OpenOptions::read_write_create()).unwrap();
        fs.write(&mut file, &[7u8; 100]).unwrap();
        fs.close(file).unwrap();

        let mut file = fs.open("t1", OpenOptions::read_only()).unwrap();
        let mut back = [0u8; 512];
        assert_eq!(fs.read(&mut file, &mut back).unwrap(), 100);
        assert_eq!(fs.read(&mut file, &mut back).unwrap(), 0);
    }

    #[test]
    fn test_sequential_writes_commit_per_flash_block() {
        let mut fs = volume();
        fs.mount().unwrap();
        let mut file = fs.open("t1", OpenOptions::read_write_create()).unwrap();
        let erases_before = fs.device().inner().erase_count();

        // 与耐久测试相同的访问模式: 写一块，定位回去，读回
        let mut generator = PatternGenerator::new(3);
        let mut block = [0u8; 512];
        let mut back = [0u8; 512];
        for n in 0..16u32 {
            generator.next_block(&mut block);
            assert_eq!(fs.write(&mut file, &block).unwrap(), 512);
            fs.seek(&mut file, n * 512).unwrap();
            assert_eq!(fs.read(&mut file, &mut back).unwrap(), 512);
            assert_eq!(back, block);
        }
        fs.close(file).unwrap();

        // 16 次写入只提交两次，远少于每次写入都重开文件时的块擦除
        let erases = fs.device().inner().erase_count() - erases_before;
        assert!(erases < 8, "{} erases for 16 writes", erases);

        generator.seed(3);
        for n in 0..16u32 {
            generator.next_block(&mut block);
            assert_eq!(read_block(&mut fs, "t1", n * 512), block);
        }
    }

    #[test]
    fn test_harness_cycle_over_littlefs() {
        let config = HarnessConfig::new()
            .file_count(3)
            .blocks_per_file(4)
            .block_size(512)
            .volume_size(Volume::total_bytes() as u32)
            .test_period_ms(0);
        let mut h: StressTest<Volume, RecordingReporter, ManualClock> =
            StressTest::new(volume(), RecordingReporter::default(), ManualClock::new(), config)
                .unwrap();

        let mut ticks = 0;
        while h.state() != State::VerifyNextFile {
            h.tick();
            ticks += 1;
            assert!(ticks < 1_000, "stuck in {:?}", h.state());
        }
        let first = read_block(h.file_system_mut(), "t1", 0);
        let mut expected = [0u8; 512];
        PatternGenerator::new(0).next_block(&mut expected);
        assert_eq!(first, expected);

        while h.reporter().cycles().is_empty() {
            h.tick();
            ticks += 1;
            assert!(ticks < 2_000, "stuck in {:?}", h.state());
        }
        let stats = h.reporter().cycles()[0];
        assert_eq!(stats.files_written, 3);
        assert_eq!(stats.blocks_verified, 12);
        assert_eq!(stats.mismatches(), 0);
        assert!(h.reporter().mismatches().is_empty());

        for index in 1..=3 {
            assert_eq!(
                h.file_system_mut()
                    .open(&file_name(index), OpenOptions::read_only())
                    .err(),
                Some(FsError::NotFound)
            );
        }

        // 第二轮不重新擦除，数据与第一轮相同
        while !(h.state() == State::VerifyNextFile && h.stats().cycle == 2) {
            h.tick();
            ticks += 1;
            assert!(ticks < 3_000, "stuck in {:?}", h.state());
        }
        assert_eq!(read_block(h.file_system_mut(), "t1", 0), first);
        assert_eq!(h.reporter().failures(), 0);
    }
}
