//! 评估流水线的数组原语: 切片分批, 3D 重组与 Dice 评估 (子模块).

use crate::consts::{organ, NUM_CLASSES};
use crate::model::SliceOutput;
use crate::prompt::UsedTargets;
use crate::Idx2d;
use itertools::Itertools;
use ndarray::{concatenate, s, Array4, ArrayView3, ArrayView4, Axis};
use std::ops::Range;

pub mod dice;

/// 将 \[0, `len_z`) 切成步长为 `batch_size` 的断点序列, 末尾以 `len_z` 收束.
///
/// 相邻断点对定义一个 slice range; 各 range 恰好无缝不重叠地覆盖
/// \[0, `len_z`), 最后一个 range 可能短于 `batch_size`.
/// `batch_size` 为 0 时 panic — 它是配置错误, 应在启动时就被拦截.
pub fn split_breakpoints(len_z: usize, batch_size: usize) -> Vec<usize> {
    assert!(batch_size > 0, "batch_size 必须为正");
    let mut bps: Vec<usize> = (0..len_z).step_by(batch_size).collect();
    bps.push(len_z);
    bps
}

/// 按升序迭代断点序列定义的全部 slice ranges.
pub fn slice_ranges(len_z: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    split_breakpoints(len_z, batch_size)
        .into_iter()
        .tuple_windows()
        .map(|(start, end)| start..end)
}

/// 空 batch 的零填充块, 形状 (14, H, W, `range_len`).
#[inline]
pub fn empty_range((h, w): Idx2d, range_len: usize) -> Array4<u8> {
    Array4::zeros((NUM_CLASSES, h, w, range_len))
}

/// 将一个 range 的模型输出散射到 (14, H, W, `range.len()`) 块中.
///
/// `outputs` 与 `used` 按位置一一对应; 对于其中每一对, 第 i 个掩码平面写入
/// `result[targets[i], .., .., z - range.start]`. 同一 (z, target)
/// 在一个 range 内不出现两次, 该不变量由上游
/// [`crate::prompt::PromptBuilder`] 保证, 这里不再检查.
///
/// 当 `outputs` 与 `used` 长度不符, 或某个输出的掩码平面数与请求的
/// target 数不符时 panic.
pub fn assemble_range(
    (h, w): Idx2d,
    range: Range<usize>,
    used: &[UsedTargets],
    outputs: &[SliceOutput],
) -> Array4<u8> {
    assert_eq!(used.len(), outputs.len(), "模型输出与 used targets 数量不一致");

    let mut result = empty_range((h, w), range.len());
    for (out, ut) in outputs.iter().zip(used.iter()) {
        debug_assert!(range.contains(&ut.z));
        assert_eq!(
            out.masks.dim().0,
            ut.targets.len(),
            "掩码平面数与 targets 数量不一致"
        );
        for (i, &target) in ut.targets.iter().enumerate() {
            debug_assert!(organ::is_organ(target));
            result
                .slice_mut(s![target as usize, .., .., ut.z - range.start])
                .assign(&out.masks.index_axis(Axis(0), i));
        }
    }
    result
}

/// 一个样本的完整 4D 分割结果, 形状 (14, H, W, Z).
///
/// 第 0 平面预留给背景, 构造上恒为零; 体素值限于 {0, 1}.
#[derive(Debug, Clone)]
pub struct SegmentVolume {
    data: Array4<u8>,
}

impl SegmentVolume {
    /// 将各 range 的块按 Z 方向升序拼接.
    ///
    /// `parts` 为空时产出 Z = 0 的空结果 (对应零切片的体数据).
    pub fn from_parts((h, w): Idx2d, parts: Vec<Array4<u8>>) -> Self {
        if parts.is_empty() {
            return Self {
                data: empty_range((h, w), 0),
            };
        }
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        // 各块前三维形状一致, 拼接不会失败.
        let data = concatenate(Axis(3), &views).unwrap();
        Self { data }
    }

    /// 某 target 的 3D 0/1 掩码平面, 形状 (H, W, Z).
    #[inline]
    pub fn target_plane(&self, target: u8) -> ArrayView3<u8> {
        self.data.index_axis(Axis(0), target as usize)
    }

    /// (类别数, 高, 宽, 切片数).
    #[inline]
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView4<u8> {
        self.data.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SliceOutput;
    use ndarray::Array3;

    #[test]
    fn test_breakpoints_partition() {
        // (len_z, batch_size, 期望断点)
        let cases: [(usize, usize, &[usize]); 6] = [
            (0, 1, &[0]),
            (1, 4, &[0, 1]),
            (4, 2, &[0, 2, 4]),
            (5, 2, &[0, 2, 4, 5]),
            (3, 1, &[0, 1, 2, 3]),
            (7, 7, &[0, 7]),
        ];
        for (len_z, batch, expected) in cases {
            assert_eq!(split_breakpoints(len_z, batch), expected);
        }
    }

    #[test]
    fn test_ranges_cover_exactly() {
        for len_z in 0..40usize {
            for batch in 1..10usize {
                let ranges: Vec<_> = slice_ranges(len_z, batch).collect();
                // 无缝、不重叠、覆盖 [0, len_z).
                let mut expect_start = 0;
                for r in &ranges {
                    assert_eq!(r.start, expect_start);
                    assert!(r.len() <= batch);
                    assert!(!r.is_empty());
                    expect_start = r.end;
                }
                assert_eq!(expect_start, len_z);
                // 最后一个 range 长度为 len_z % batch (整除时为 batch).
                if let Some(last) = ranges.last() {
                    let tail = if len_z % batch == 0 { batch } else { len_z % batch };
                    assert_eq!(last.len(), tail);
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn test_zero_batch_rejected() {
        split_breakpoints(10, 0);
    }

    #[test]
    fn test_empty_range_block() {
        let block = empty_range((3, 4), 2);
        assert_eq!(block.dim(), (NUM_CLASSES, 3, 4, 2));
        assert_eq!(block.sum(), 0);
    }

    #[test]
    fn test_assemble_places_single_target() {
        // range [6, 8), z=7 上只有 target 9, 掩码为已知图案.
        let mut mask = Array3::<u8>::zeros((1, 2, 3));
        mask[(0, 0, 1)] = 1;
        mask[(0, 1, 2)] = 1;
        let outputs = vec![SliceOutput {
            masks: mask,
            iou: vec![0.9],
        }];
        let used = vec![UsedTargets {
            z: 7,
            targets: vec![9],
        }];

        let block = assemble_range((2, 3), 6..8, &used, &outputs);
        assert_eq!(block.dim(), (NUM_CLASSES, 2, 3, 2));
        assert_eq!(block.sum(), 2);
        assert_eq!(block[(9, 0, 1, 1)], 1);
        assert_eq!(block[(9, 1, 2, 1)], 1);
        // z=6 平面与其它类别全部为零.
        assert_eq!(block.index_axis(Axis(3), 0).sum(), 0);
        assert_eq!(block.index_axis(Axis(0), 9).sum(), 2);
    }

    #[test]
    fn test_from_parts_concat() {
        let mut a = empty_range((2, 2), 2);
        a[(5, 0, 0, 1)] = 1;
        let mut b = empty_range((2, 2), 1);
        b[(5, 1, 1, 0)] = 1;

        let seg = SegmentVolume::from_parts((2, 2), vec![a, b]);
        assert_eq!(seg.dim(), (NUM_CLASSES, 2, 2, 3));
        let plane = seg.target_plane(5);
        assert_eq!(plane.sum(), 2);
        assert_eq!(plane[(0, 0, 1)], 1);
        assert_eq!(plane[(1, 1, 2)], 1);

        let empty = SegmentVolume::from_parts((2, 2), Vec::new());
        assert_eq!(empty.dim(), (NUM_CLASSES, 2, 2, 0));
    }
}
