//! flashtest 固件 - ESP32-S3 内部 Flash 大文件耐久测试
//!
//! 在存储分区上挂载 littlefs，循环执行擦除 / 写入 / 校验 / 删除。
//!
//! 硬件目标: ESP32-S3-N16R8 (16MB Flash, 8MB PSRAM)
//!
//! # 运行
//! ```bash
//! cargo run --release --features dev --target xtensa-esp32s3-none-elf
//! ```

#![no_std]
#![no_main]

esp_bootloader_esp_idf::esp_app_desc!();

mod tasks;

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

use flashtest::fs::{FlashConfig, NorFlashDevice};
use flashtest::{log_error, log_info, HarnessConfig, StressTest};

use tasks::stress::{
    EmbassyClock, Harness, SignalReporter, StorageVolume, STORAGE_FILE_COUNT, STORAGE_OFFSET,
    STORAGE_SIZE,
};

// ===== Panic Handler =====
#[cfg(any(feature = "dev", feature = "log-println"))]
use esp_backtrace as _;

#[cfg(feature = "log-defmt")]
use defmt_rtt as _;

#[cfg(not(any(feature = "dev", feature = "log-println")))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

// ===== 静态分配 =====
/// 状态机含两个块缓冲区，放在静态区而不是任务栈上
static HARNESS: StaticCell<Harness> = StaticCell::new();

/// 初始化失败后停在这里
async fn halt() -> ! {
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

// ===== 主入口点 =====
#[esp_rtos::main]
async fn main(spawner: Spawner) {
    // ========================================
    // 1. 硬件初始化
    // ========================================
    let peripherals = esp_hal::init(esp_hal::Config::default());

    log_info!("{} v{} starting on ESP32-S3", flashtest::NAME, flashtest::VERSION);

    // ========================================
    // 2. Embassy 时间驱动
    // ========================================
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // ========================================
    // 3. 存储分区 + littlefs
    // ========================================
    let flash = FlashStorage::new(peripherals.FLASH);
    let device = match NorFlashDevice::new(flash, FlashConfig::new(STORAGE_OFFSET, STORAGE_SIZE)) {
        Ok(device) => device,
        Err(e) => {
            log_error!("storage partition rejected: {}", e);
            halt().await
        }
    };
    log_info!(
        "storage partition: offset=0x{:X}, size=0x{:X}, littlefs {} bytes",
        STORAGE_OFFSET,
        STORAGE_SIZE,
        StorageVolume::total_bytes()
    );

    // ========================================
    // 4. 耐久测试状态机
    // ========================================
    let config = HarnessConfig::new()
        .file_count(STORAGE_FILE_COUNT)
        .volume_size(STORAGE_SIZE);

    let harness = match StressTest::new(
        StorageVolume::new(device),
        SignalReporter::default(),
        EmbassyClock,
        config,
    ) {
        Ok(harness) => harness,
        Err(e) => {
            log_error!("invalid harness config: {}", e);
            halt().await
        }
    };
    let harness = HARNESS.init(harness);

    spawner.must_spawn(tasks::stress::stress_task(harness));
    spawner.must_spawn(tasks::stress::monitor_task());

    log_info!("All tasks spawned, entering main loop");

    // ========================================
    // 5. 主循环 - 心跳
    // ========================================
    let mut minutes: u64 = 0;
    loop {
        Timer::after(Duration::from_secs(60)).await;
        minutes += 1;
        if minutes % 10 == 0 {
            log_info!("System heartbeat: {} minutes", minutes);
        }
    }
}
