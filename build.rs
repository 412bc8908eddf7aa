use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // 主机端单元测试不需要任何 ESP 相关的链接配置
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if target_arch != "xtensa" {
        return;
    }

    // 配置 PSRAM 模式 (ESP32-S3-N16R8 使用 Octal PSRAM)
    println!("cargo:rustc-env=ESP_HAL_CONFIG_PSRAM_MODE=octal");

    // 添加 ld 目录到链接路径（如果有自定义链接脚本）
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        println!("cargo:rustc-link-search={}/ld", manifest_dir);
    }
}
