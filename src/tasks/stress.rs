//! 耐久测试任务
//!
//! 状态机每个 tick 同步执行一步 Flash 操作，任务在两次 tick 之间让出执行器；
//! 等待下一轮和失败之后改为定时轮询。每轮完成的统计通过 [`CYCLE_STATS`] 发布。

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use esp_storage::FlashStorage;

use flashtest::fs::{LittleFsVolume, NorFlashDevice};
use flashtest::harness::{Clock, LogReporter, Mismatch, Phase, Reporter, ShortRead};
use flashtest::{log_info, HarnessError, RunStats, State, StressTest};

/// 存储分区偏移 (app 分区之后)
pub const STORAGE_OFFSET: u32 = 0x110000;

/// 存储分区大小 (到 16 MiB 末尾)
pub const STORAGE_SIZE: u32 = 0xEF0000;

/// 分区包含的 littlefs 块数
pub const STORAGE_BLOCKS: usize = STORAGE_SIZE as usize / flashtest::fs::littlefs::LFS_BLOCK_SIZE;

/// 内部 Flash 上的文件数 (约占分区的 75%)
pub const STORAGE_FILE_COUNT: u32 = 44;

/// 等待下一轮时的轮询间隔
const IDLE_POLL: Duration = Duration::from_millis(100);

/// 失败后的轮询间隔
const FAILED_POLL: Duration = Duration::from_secs(60);

pub type StorageVolume = LittleFsVolume<NorFlashDevice<FlashStorage<'static>>, STORAGE_BLOCKS>;

pub type Harness = StressTest<StorageVolume, SignalReporter, EmbassyClock>;

/// 每轮完成的统计 (只保留最新一轮)
pub static CYCLE_STATS: Signal<CriticalSectionRawMutex, RunStats> = Signal::new();

/// embassy 时间驱动
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 写日志，并把每轮统计发布到 [`CYCLE_STATS`]
#[derive(Default)]
pub struct SignalReporter {
    log: LogReporter,
}

impl Reporter for SignalReporter {
    fn phase_started(&mut self, phase: Phase) {
        self.log.phase_started(phase);
    }

    fn phase_finished(&mut self, phase: Phase, elapsed: Duration) {
        self.log.phase_finished(phase, elapsed);
    }

    fn mismatch(&mut self, mismatch: &Mismatch) {
        self.log.mismatch(mismatch);
    }

    fn short_read(&mut self, short: &ShortRead) {
        self.log.short_read(short);
    }

    fn cycle_completed(&mut self, stats: &RunStats) {
        self.log.cycle_completed(stats);
        CYCLE_STATS.signal(*stats);
    }

    fn failure(&mut self, error: &HarnessError) {
        self.log.failure(error);
    }
}

/// 驱动状态机
#[embassy_executor::task]
pub async fn stress_task(harness: &'static mut Harness) {
    log_info!(
        "stress task started: {} files x {} bytes",
        harness.config().file_count,
        harness.config().file_size()
    );

    loop {
        match harness.tick() {
            State::WaitNextRun => Timer::after(IDLE_POLL).await,
            State::Failure(_) => Timer::after(FAILED_POLL).await,
            _ => yield_now().await,
        }
    }
}

/// 汇总每轮结果
#[embassy_executor::task]
pub async fn monitor_task() {
    let mut clean_cycles: u32 = 0;

    loop {
        let stats = CYCLE_STATS.wait().await;
        if stats.mismatches() == 0 {
            clean_cycles += 1;
        }
        log_info!(
            "cycle {} done, {} of {} cycles clean",
            stats.cycle,
            clean_cycles,
            stats.cycle
        );
    }
}
