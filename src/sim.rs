//! 主机端测试用的模拟设备
//!
//! - [`RamFlash`]: 内存中的 `NorFlash` (NOR 语义: 写入只能把 1 变成 0)
//! - [`SimFs`]: 内存文件系统，可注入挂载、打开、写入和读取故障
//! - [`ManualClock`]: 手动推进的时钟
//! - [`RecordingReporter`]: 记录全部上报事件

use std::cell::Cell;
use std::collections::BTreeMap;

use embassy_time::{Duration, Instant};
use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};

use crate::error::HarnessError;
use crate::fs::{FileSystem, FlashDevice, FsError, OpenOptions, StorageError};
use crate::harness::{Clock, Mismatch, Phase, Reporter, RunStats, ShortRead};

/// 模拟扇区大小
pub const SIM_SECTOR_SIZE: usize = 4096;

// ==================== RamFlash ====================

pub struct RamFlash {
    data: Vec<u8>,
    erased_sectors: u32,
}

impl RamFlash {
    /// `size` 字节，初始为擦除态
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            erased_sectors: 0,
        }
    }

    /// 累计擦除的扇区数
    pub fn erase_count(&self) -> u32 {
        self.erased_sectors
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(StorageError::OutOfBounds)?;
        if end > self.data.len() {
            return Err(StorageError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ErrorType for RamFlash {
    type Error = StorageError;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SIM_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from as usize % SIM_SECTOR_SIZE != 0 || to as usize % SIM_SECTOR_SIZE != 0 || from > to {
            return Err(StorageError::AlignmentError);
        }
        let range = self.range(from, (to - from) as usize)?;
        self.data[range].fill(0xFF);
        self.erased_sectors += (to - from) / SIM_SECTOR_SIZE as u32;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        for (cell, &b) in self.data[range].iter_mut().zip(bytes) {
            *cell &= b;
        }
        Ok(())
    }
}

// ==================== SimChip ====================

/// 不保存数据的芯片，只记录整卷操作
pub struct SimChip {
    capacity: usize,
    /// 复位后能否探测到芯片
    pub detected: bool,
    pub extended: bool,
    pub resets: u32,
    pub erases: u32,
}

impl SimChip {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity as usize,
            detected: true,
            extended: false,
            resets: 0,
            erases: 0,
        }
    }
}

impl ErrorType for SimChip {
    type Error = StorageError;
}

impl ReadNorFlash for SimChip {
    const READ_SIZE: usize = 1;

    fn read(&mut self, _offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        bytes.fill(0xFF);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl NorFlash for SimChip {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SIM_SECTOR_SIZE;

    fn erase(&mut self, _from: u32, _to: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl FlashDevice for SimChip {
    fn reset(&mut self) -> Result<(), StorageError> {
        self.resets += 1;
        self.extended = false;
        Ok(())
    }

    fn is_valid(&mut self) -> bool {
        self.detected
    }

    fn set_extended_addressing(&mut self, enabled: bool) -> Result<(), StorageError> {
        self.extended = enabled;
        Ok(())
    }

    fn extended_addressing(&self) -> bool {
        self.extended
    }

    fn chip_erase(&mut self) -> Result<(), StorageError> {
        self.erases += 1;
        Ok(())
    }
}

// ==================== SimFs ====================

#[derive(Debug)]
pub struct SimFile {
    name: String,
    position: u32,
    options: OpenOptions,
}

/// 内存文件系统
///
/// 芯片整片擦除后的下一次挂载会清空全部文件。
pub struct SimFs {
    chip: SimChip,
    files: BTreeMap<String, Vec<u8>>,
    mounted: bool,
    erases_seen: u32,
    writes: u64,
    /// 文件系统和设备操作总数
    pub ops: u64,
    /// 按创建顺序记录的文件名
    pub created: Vec<String>,
    pub open_handles: usize,
    pub closes: u64,
    pub fail_mount: bool,
    /// 关闭时返回 `IoError` (句柄仍然释放)
    pub fail_close: bool,
    /// 打开该文件时返回 `IoError`
    pub fail_open: Option<String>,
    /// 第 n 次写入 (从 1 开始) 只写一半
    pub short_write_at: Option<u64>,
    /// 读取该文件时翻转指定偏移处的字节 (存储内容不变)
    pub read_fault: Option<(String, u32)>,
}

impl SimFs {
    pub fn new(capacity: u32) -> Self {
        Self {
            chip: SimChip::new(capacity),
            files: BTreeMap::new(),
            mounted: false,
            erases_seen: 0,
            writes: 0,
            ops: 0,
            created: Vec::new(),
            open_handles: 0,
            closes: 0,
            fail_mount: false,
            fail_close: false,
            fail_open: None,
            short_write_at: None,
            read_fault: None,
        }
    }

    pub fn chip(&self) -> &SimChip {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut SimChip {
        &mut self.chip
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|data| data.as_slice())
    }

    /// 翻转存储中的一个字节
    pub fn corrupt(&mut self, name: &str, offset: usize) {
        if let Some(byte) = self.files.get_mut(name).and_then(|data| data.get_mut(offset)) {
            *byte = !*byte;
        }
    }

    pub fn truncate(&mut self, name: &str, len: usize) {
        if let Some(data) = self.files.get_mut(name) {
            data.truncate(len);
        }
    }
}

impl FileSystem for SimFs {
    type Device = SimChip;
    type File = SimFile;

    fn device(&mut self) -> &mut SimChip {
        self.ops += 1;
        &mut self.chip
    }

    fn mount(&mut self) -> Result<(), FsError> {
        self.ops += 1;
        if self.fail_mount {
            return Err(FsError::MountFailed);
        }
        if self.chip.erases != self.erases_seen {
            self.files.clear();
            self.erases_seen = self.chip.erases;
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), FsError> {
        self.ops += 1;
        self.mounted = false;
        Ok(())
    }

    fn open(&mut self, path: &str, options: OpenOptions) -> Result<SimFile, FsError> {
        self.ops += 1;
        if !self.mounted {
            return Err(FsError::NotMounted);
        }
        if self.fail_open.as_deref() == Some(path) {
            return Err(FsError::IoError);
        }

        if !self.files.contains_key(path) {
            if !options.create {
                return Err(FsError::NotFound);
            }
            self.files.insert(path.into(), Vec::new());
            self.created.push(path.into());
        }

        self.open_handles += 1;
        Ok(SimFile {
            name: path.into(),
            position: 0,
            options,
        })
    }

    fn read(&mut self, file: &mut SimFile, buffer: &mut [u8]) -> Result<usize, FsError> {
        self.ops += 1;
        if !file.options.read {
            return Err(FsError::InvalidHandle);
        }
        let data = self.files.get(&file.name).ok_or(FsError::NotFound)?;

        let start = (file.position as usize).min(data.len());
        let n = buffer.len().min(data.len() - start);
        buffer[..n].copy_from_slice(&data[start..start + n]);

        if let Some((name, offset)) = &self.read_fault {
            let offset = *offset as usize;
            if *name == file.name && (start..start + n).contains(&offset) {
                buffer[offset - start] = !buffer[offset - start];
            }
        }

        file.position += n as u32;
        Ok(n)
    }

    fn write(&mut self, file: &mut SimFile, data: &[u8]) -> Result<usize, FsError> {
        self.ops += 1;
        self.writes += 1;
        if !file.options.write {
            return Err(FsError::InvalidHandle);
        }

        let len = if self.short_write_at == Some(self.writes) {
            data.len() / 2
        } else {
            data.len()
        };

        let stored = self.files.get_mut(&file.name).ok_or(FsError::NotFound)?;
        let start = file.position as usize;
        if stored.len() < start + len {
            stored.resize(start + len, 0);
        }
        stored[start..start + len].copy_from_slice(&data[..len]);
        file.position += len as u32;
        Ok(len)
    }

    fn seek(&mut self, file: &mut SimFile, offset: u32) -> Result<(), FsError> {
        self.ops += 1;
        file.position = offset;
        Ok(())
    }

    fn close(&mut self, _file: SimFile) -> Result<(), FsError> {
        self.ops += 1;
        self.open_handles -= 1;
        self.closes += 1;
        if self.fail_close {
            return Err(FsError::IoError);
        }
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), FsError> {
        self.ops += 1;
        self.files.remove(path).map(|_| ()).ok_or(FsError::NotFound)
    }
}

// ==================== ManualClock ====================

/// 手动推进的时钟；`step` 非零时每次读取后自动前进
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Cell<u64>,
    step_ms: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(step_ms: u64) -> Self {
        Self {
            now_ms: Cell::new(0),
            step_ms,
        }
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let now = self.now_ms.get();
        self.now_ms.set(now + self.step_ms);
        Instant::from_millis(now)
    }
}

// ==================== RecordingReporter ====================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PhaseStarted(Phase),
    PhaseFinished(Phase, Duration),
    Mismatch(Mismatch),
    ShortRead(ShortRead),
    CycleCompleted(RunStats),
    Failure(HarnessError),
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<Event>,
}

impl RecordingReporter {
    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Mismatch(m) => Some(*m),
                _ => None,
            })
            .collect()
    }

    pub fn short_reads(&self) -> Vec<ShortRead> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::ShortRead(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn cycles(&self) -> Vec<RunStats> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::CycleCompleted(stats) => Some(*stats),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Failure(_)))
            .count()
    }
}

impl Reporter for RecordingReporter {
    fn phase_started(&mut self, phase: Phase) {
        self.events.push(Event::PhaseStarted(phase));
    }

    fn phase_finished(&mut self, phase: Phase, elapsed: Duration) {
        self.events.push(Event::PhaseFinished(phase, elapsed));
    }

    fn mismatch(&mut self, mismatch: &Mismatch) {
        self.events.push(Event::Mismatch(*mismatch));
    }

    fn short_read(&mut self, short: &ShortRead) {
        self.events.push(Event::ShortRead(*short));
    }

    fn cycle_completed(&mut self, stats: &RunStats) {
        self.events.push(Event::CycleCompleted(*stats));
    }

    fn failure(&mut self, error: &HarnessError) {
        self.events.push(Event::Failure(*error));
    }
}
