//! 大文件耐久测试状态机
//!
//! 一轮测试: 复位并整片擦除芯片 → 挂载 → 写满 `file_count` 个文件 (每块写后立即回读) →
//! 用同一种子重放生成器校验全部文件 → 删除全部文件 → 立即开始下一轮。
//!
//! 两次校验各有分工: 立即回读发现写入通路的瞬时故障，全卷校验发现整卷写满之后才出现的
//! 数据保持或跨文件损坏。设备、挂载、打开和写入错误是致命的；数据不一致只上报并计数，
//! 一次扫描就能看到损坏的完整范围。

use embassy_time::{Duration, Instant};

use super::clock::Clock;
use super::pattern::PatternGenerator;
use super::report::{Pass, Phase, Reporter, RunStats};
use super::state::{BlockPosition, FileUnderTest, State, TestRun, VolumeState};
use super::verify::compare_block;
use crate::config::{ConfigError, HarnessConfig};
use crate::error::{HarnessError, IoFault};
use crate::fs::storage::needs_extended_addressing;
use crate::fs::{file_name, FileSystem, FlashDevice, FsError, OpenOptions, StorageError};
use crate::{log_debug, log_info, log_warn};

/// 默认块缓冲区容量 (字节)
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// 耐久测试状态机
///
/// `N` 为写入/读回缓冲区的容量，配置中的块大小不得超过它。
/// 内存占用与文件数无关: 期望数据随时由生成器重新计算。
pub struct StressTest<F: FileSystem, R, C, const N: usize = DEFAULT_BUFFER_SIZE> {
    fs: F,
    reporter: R,
    clock: C,
    config: HarnessConfig,
    state: State,
    volume: VolumeState,
    pattern: PatternGenerator,
    run: Option<TestRun>,
    stats: RunStats,
    /// 当前文件编号，0 表示尚未开始
    file_index: u32,
    current: Option<FileUnderTest>,
    file: Option<F::File>,
    /// 当前块编号，0 表示尚未开始
    block: u32,
    offset: u32,
    /// 上一次开始测试的时刻 (创建时为创建时刻)
    last_run: Instant,
    pass_started: Instant,
    file_started: Instant,
    expected: [u8; N],
    observed: [u8; N],
}

impl<F, R, C, const N: usize> StressTest<F, R, C, N>
where
    F: FileSystem,
    R: Reporter,
    C: Clock,
{
    /// 创建状态机，初始状态为 `WaitNextRun`
    pub fn new(fs: F, reporter: R, clock: C, config: HarnessConfig) -> Result<Self, ConfigError> {
        config.validate_for(N)?;

        let now = clock.now();
        Ok(Self {
            fs,
            reporter,
            clock,
            config,
            state: State::WaitNextRun,
            volume: VolumeState::Unknown,
            pattern: PatternGenerator::new(config.seed),
            run: None,
            stats: RunStats::new(0),
            file_index: 0,
            current: None,
            file: None,
            block: 0,
            offset: 0,
            last_run: now,
            pass_started: now,
            file_started: now,
            expected: [0; N],
            observed: [0; N],
        })
    }

    /// 执行当前状态一次，返回之后的状态
    pub fn tick(&mut self) -> State {
        let result = match self.state {
            State::WaitNextRun => Ok(self.wait_next_run()),
            State::ChipEraseAndMount => self.chip_erase_and_mount(),
            State::StartNextFile => self.start_next_file(),
            State::WriteAndTest => self.write_and_test(),
            State::VerifyNextFile => self.verify_next_file(),
            State::VerifyBlocks => self.verify_blocks(),
            State::DeleteFiles => Ok(self.delete_files()),
            State::Failure(_) => return self.state,
        };

        self.transition(result.unwrap_or_else(State::Failure));
        self.state
    }

    /// 当前状态
    pub fn state(&self) -> State {
        self.state
    }

    /// 卷状态
    pub fn volume_state(&self) -> VolumeState {
        self.volume
    }

    /// 当前一轮的参数 (首次擦除之前为 `None`)
    pub fn run(&self) -> Option<&TestRun> {
        self.run.as_ref()
    }

    /// 当前一轮的统计
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// 正在写入或校验的文件
    pub fn current_file(&self) -> Option<&FileUnderTest> {
        self.current.as_ref()
    }

    /// 配置
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// 文件系统
    pub fn file_system(&self) -> &F {
        &self.fs
    }

    /// 文件系统 (可变)
    pub fn file_system_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    /// 上报器
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// 时钟
    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ==================== 状态转换 ====================

    fn transition(&mut self, next: State) {
        if let State::Failure(error) = next {
            if !self.state.is_failure() {
                self.enter_failure(error);
            }
        }
        self.state = next;
    }

    /// 进入 `Failure` 时执行一次
    fn enter_failure(&mut self, error: HarnessError) {
        if let Some(file) = self.file.take() {
            if let Err(e) = self.fs.close(file) {
                log_warn!("close t{} failed: {}", self.file_index, e);
            }
        }
        self.current = None;

        if matches!(error, HarnessError::Device(_) | HarnessError::Mount(_)) {
            self.volume = VolumeState::Failed;
        }
        self.reporter.failure(&error);
    }

    // ==================== 状态处理 ====================

    fn wait_next_run(&mut self) -> State {
        let now = self.clock.now();
        let due = now
            .checked_duration_since(self.last_run)
            .map_or(false, |elapsed| elapsed.as_millis() >= self.config.test_period_ms);

        if !due {
            return State::WaitNextRun;
        }

        self.last_run = now;
        State::ChipEraseAndMount
    }

    fn chip_erase_and_mount(&mut self) -> Result<State, HarnessError> {
        log_info!("sending reset to flash chip");
        let device = self.fs.device();
        device.reset().map_err(HarnessError::Device)?;

        if !device.is_valid() {
            log_info!("failed to detect flash chip");
            return Err(HarnessError::Device(StorageError::NotDetected));
        }

        if needs_extended_addressing(self.config.volume_size) {
            device
                .set_extended_addressing(true)
                .map_err(HarnessError::Device)?;
        }

        self.fs.unmount().map_err(HarnessError::Mount)?;
        self.volume = VolumeState::Unknown;

        let started = self.begin(Phase::ChipErase);
        self.fs.device().chip_erase().map_err(HarnessError::Device)?;
        self.finish(Phase::ChipErase, started);
        self.volume = VolumeState::Erased;

        self.fs.mount().map_err(HarnessError::Mount)?;
        log_info!("mount ok");
        self.volume = VolumeState::Mounted;

        self.start_write_pass(TestRun::first(&self.config));
        Ok(State::StartNextFile)
    }

    fn start_next_file(&mut self) -> Result<State, HarnessError> {
        let run = self.current_run();

        self.file_index += 1;
        if self.file_index > run.file_count {
            log_info!("writes completed, verifying files now");
            self.finish(Phase::WritePass, self.pass_started);
            self.pattern.seed(run.seed);
            self.file_index = 0;
            self.pass_started = self.begin(Phase::VerifyPass);
            return Ok(State::VerifyNextFile);
        }

        let target = FileUnderTest::new(self.file_index, &run);
        let file = self
            .fs
            .open(&target.name, OpenOptions::read_write_create())
            .map_err(|error| IoFault::Open {
                file: target.index,
                error,
            })?;

        log_debug!("writing {} ({} bytes)", target.name.as_str(), target.size);
        self.file = Some(file);
        self.block = 0;
        self.offset = 0;
        self.file_started = self.begin(Phase::WriteFile(target.index));
        self.current = Some(target);
        Ok(State::WriteAndTest)
    }

    fn write_and_test(&mut self) -> Result<State, HarnessError> {
        self.block += 1;
        if self.block > self.config.blocks_per_file {
            self.close_file();
            self.stats.files_written += 1;
            self.finish(Phase::WriteFile(self.file_index), self.file_started);
            return Ok(State::StartNextFile);
        }

        let size = self.config.block_size;
        let position = self.position();
        let offset = position.file_offset;
        let file = self.file.as_mut().ok_or(IoFault::Write {
            file: position.file,
            offset,
            error: FsError::InvalidHandle,
        })?;

        self.pattern.next_block(&mut self.expected[..size]);

        let written = self
            .fs
            .write(file, &self.expected[..size])
            .map_err(|error| IoFault::Write {
                file: position.file,
                offset,
                error,
            })?;
        if written != size {
            return Err(IoFault::ShortWrite {
                file: position.file,
                offset,
                written,
                expected: size,
            }
            .into());
        }
        self.offset += size as u32;
        self.stats.blocks_written += 1;
        self.stats.bytes_written += size as u64;

        // 立即回读刚写入的区间
        self.fs
            .seek(file, offset)
            .map_err(|error| IoFault::Seek {
                file: position.file,
                offset,
                error,
            })?;
        let read = self
            .fs
            .read(file, &mut self.observed[..size])
            .map_err(|error| IoFault::Read {
                file: position.file,
                offset,
                error,
            })?;

        if read < size {
            // 读取不足时文件指针没有回到块末尾，下一块仍需从这里写
            self.fs
                .seek(file, self.offset)
                .map_err(|error| IoFault::Seek {
                    file: position.file,
                    offset: self.offset,
                    error,
                })?;
        }

        let reports = compare_block(
            &mut self.reporter,
            Pass::Readback,
            position,
            &self.expected[..size],
            &self.observed[..size],
            read,
        );
        self.stats.record_mismatches(Pass::Readback, reports);

        Ok(State::WriteAndTest)
    }

    fn verify_next_file(&mut self) -> Result<State, HarnessError> {
        let run = self.current_run();

        self.file_index += 1;
        if self.file_index > run.file_count {
            log_info!("tests completed!");
            self.finish(Phase::VerifyPass, self.pass_started);
            return Ok(State::DeleteFiles);
        }

        let target = FileUnderTest::new(self.file_index, &run);
        let file = self
            .fs
            .open(&target.name, OpenOptions::read_only())
            .map_err(|error| IoFault::Open {
                file: target.index,
                error,
            })?;

        self.file = Some(file);
        self.block = 0;
        self.offset = 0;
        self.file_started = self.begin(Phase::VerifyFile(target.index));
        self.current = Some(target);
        Ok(State::VerifyBlocks)
    }

    fn verify_blocks(&mut self) -> Result<State, HarnessError> {
        self.block += 1;
        if self.block > self.config.blocks_per_file {
            self.close_file();
            self.finish(Phase::VerifyFile(self.file_index), self.file_started);
            return Ok(State::VerifyNextFile);
        }

        let size = self.config.block_size;
        let position = self.position();
        let file = self.file.as_mut().ok_or(IoFault::Read {
            file: position.file,
            offset: position.file_offset,
            error: FsError::InvalidHandle,
        })?;

        self.pattern.next_block(&mut self.expected[..size]);

        let read = self
            .fs
            .read(file, &mut self.observed[..size])
            .map_err(|error| IoFault::Read {
                file: position.file,
                offset: position.file_offset,
                error,
            })?;
        self.offset += size as u32;
        self.stats.blocks_verified += 1;

        let reports = compare_block(
            &mut self.reporter,
            Pass::Verify,
            position,
            &self.expected[..size],
            &self.observed[..size],
            read,
        );
        self.stats.record_mismatches(Pass::Verify, reports);

        Ok(State::VerifyBlocks)
    }

    fn delete_files(&mut self) -> State {
        let run = self.current_run();

        let started = self.begin(Phase::DeleteFiles);
        for index in 1..=run.file_count {
            let name = file_name(index);
            match self.fs.remove(&name) {
                Ok(()) | Err(FsError::NotFound) => {}
                Err(e) => log_warn!("unlink {} failed: {}", name.as_str(), e),
            }
        }
        self.finish(Phase::DeleteFiles, started);
        self.reporter.cycle_completed(&self.stats);

        log_info!("running tests again...");
        self.start_write_pass(run.next());
        State::StartNextFile
    }

    // ==================== 内部方法 ====================

    fn start_write_pass(&mut self, run: TestRun) {
        log_debug!("cycle {} seed {}", run.cycle, run.seed);
        self.pattern.seed(run.seed);
        self.file_index = 0;
        self.stats = RunStats::new(run.cycle);
        self.run = Some(run);
        self.pass_started = self.begin(Phase::WritePass);
    }

    fn current_run(&self) -> TestRun {
        self.run.unwrap_or_else(|| TestRun::first(&self.config))
    }

    fn position(&self) -> BlockPosition {
        BlockPosition {
            file: self.file_index,
            block: self.block,
            file_offset: self.offset,
        }
    }

    fn close_file(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = self.fs.close(file) {
                log_warn!("close t{} failed: {}", self.file_index, e);
            }
        }
        self.current = None;
    }

    fn begin(&mut self, phase: Phase) -> Instant {
        self.reporter.phase_started(phase);
        self.clock.now()
    }

    fn finish(&mut self, phase: Phase, started: Instant) {
        let elapsed = self
            .clock
            .now()
            .checked_duration_since(started)
            .unwrap_or(Duration::from_ticks(0));
        self.reporter.phase_finished(phase, elapsed);
    }
}
