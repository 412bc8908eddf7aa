//! 逐字节比较期望数据和读回数据

use super::report::{Mismatch, Pass, Reporter, ShortRead};
use super::state::BlockPosition;

/// 比较一个块，逐个上报不一致的字节，返回上报次数
///
/// `observed` 只有前 `read` 字节有效；不足部分作为一次 [`ShortRead`] 上报，
/// 不再逐字节比较。
pub fn compare_block<R: Reporter>(
    reporter: &mut R,
    pass: Pass,
    position: BlockPosition,
    expected: &[u8],
    observed: &[u8],
    read: usize,
) -> u32 {
    let valid = read.min(expected.len()).min(observed.len());
    let mut reports = 0;

    for (byte_offset, (&want, &got)) in expected[..valid].iter().zip(&observed[..valid]).enumerate() {
        if want != got {
            reporter.mismatch(&Mismatch {
                pass,
                position,
                byte_offset,
                expected: want,
                actual: got,
            });
            reports += 1;
        }
    }

    if valid < expected.len() {
        reporter.short_read(&ShortRead {
            pass,
            position,
            requested: expected.len(),
            read,
        });
        reports += 1;
    }

    reports
}
