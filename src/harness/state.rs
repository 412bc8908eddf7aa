//! 状态机的状态与数据模型

use core::fmt;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::fs::{file_name, FileName};

/// 耐久测试状态
///
/// 每个 tick 执行一个状态处理函数，由它返回下一个状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// 等待下一次测试
    WaitNextRun,
    /// 复位芯片、整片擦除并挂载
    ChipEraseAndMount,
    /// 创建下一个文件
    StartNextFile,
    /// 写入一块并立即回读
    WriteAndTest,
    /// 打开下一个待校验文件
    VerifyNextFile,
    /// 校验一块
    VerifyBlocks,
    /// 删除全部文件并开始下一轮
    DeleteFiles,
    /// 吸收态，测试停止
    Failure(HarnessError),
}

impl State {
    /// 是否为吸收态
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// 卷状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VolumeState {
    /// 尚未操作
    Unknown,
    /// 已整片擦除
    Erased,
    /// 已挂载
    Mounted,
    /// 设备或挂载失败
    Failed,
}

/// 一轮测试的参数
///
/// 进入擦除/挂载阶段时创建；删除阶段用同一种子开始下一轮时被替换 (`cycle + 1`)。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRun {
    /// 生成器种子
    pub seed: u32,
    /// 文件数
    pub file_count: u32,
    /// 每文件块数
    pub blocks_per_file: u32,
    /// 块大小
    pub block_size: usize,
    /// 轮次，从 1 开始
    pub cycle: u32,
}

impl TestRun {
    /// 第一轮
    pub fn first(config: &HarnessConfig) -> Self {
        Self {
            seed: config.seed,
            file_count: config.file_count,
            blocks_per_file: config.blocks_per_file,
            block_size: config.block_size,
            cycle: 1,
        }
    }

    /// 下一轮 (参数和种子不变)
    pub fn next(&self) -> Self {
        Self {
            cycle: self.cycle + 1,
            ..*self
        }
    }

    /// 单个文件大小
    pub fn file_size(&self) -> u32 {
        self.blocks_per_file * self.block_size as u32
    }
}

/// 正在写入或校验的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUnderTest {
    /// 编号，1..=file_count
    pub index: u32,
    /// 文件名 `t<index>`
    pub name: FileName,
    /// 完整写入后的大小
    pub size: u32,
}

impl FileUnderTest {
    /// 第 `index` 个文件
    pub fn new(index: u32, run: &TestRun) -> Self {
        Self {
            index,
            name: file_name(index),
            size: run.file_size(),
        }
    }
}

/// 数据块在卷上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockPosition {
    /// 文件编号
    pub file: u32,
    /// 块编号，从 1 开始
    pub block: u32,
    /// 块在文件中的起始偏移
    pub file_offset: u32,
}

impl fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{} block {} (offset {})", self.file, self.block, self.file_offset)
    }
}
