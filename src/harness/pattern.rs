//! 确定性测试数据生成
//!
//! 写入阶段和校验阶段相隔很久，期望数据不落盘，而是用同一个种子重放生成器得到。
//! 生成器与参考工具链 C 库的 `rand()` 逐位一致 (64 位 LCG，取高 31 位)，
//! 因此两边工具生成的测试卷可以互相校验。

/// LCG 乘数
const MULTIPLIER: u64 = 6_364_136_223_846_793_005;

/// 单次抽取的最大值 (`RAND_MAX`)
const DRAW_MASK: u32 = 0x7FFF_FFFF;

/// 每次抽取产生的字节数
pub const DRAW_BYTES: usize = 4;

/// 确定性伪随机字节流
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternGenerator {
    state: u64,
}

impl PatternGenerator {
    /// 以 `seed` 初始化
    pub const fn new(seed: u32) -> Self {
        Self { state: seed as u64 }
    }

    /// 重置内部状态
    pub fn seed(&mut self, seed: u32) {
        self.state = seed as u64;
    }

    /// 下一次抽取 (0..=0x7FFF_FFFF)
    pub fn next_draw(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(1);
        (self.state >> 32) as u32 & DRAW_MASK
    }

    /// 用后续抽取填满 `buffer`
    ///
    /// 每次抽取按高字节在前写入 4 字节；末尾不足 4 字节时仍消耗一次完整抽取。
    pub fn next_block(&mut self, buffer: &mut [u8]) {
        for chunk in buffer.chunks_mut(DRAW_BYTES) {
            let bytes = self.next_draw().to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

impl Default for PatternGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}
