//! Dice 系数与单样本评估报告.

use super::SegmentVolume;
use crate::consts::{self, NUM_CLASSES};
use crate::CtLabel;
use ndarray::{ArrayView3, Zip};

/// 计算某 target 的 Dice 系数: `2|pred ∩ truth| / (|pred| + |truth|)`.
///
/// `pred` 为 0/1 掩码, `label` 为整数标签体数据, 真值掩码取
/// `label == target`. 真值中该 target 不存在时返回 `None`
/// (该样本对此 target 不可计分, 不是错误).
pub fn dice_score(pred: ArrayView3<u8>, label: ArrayView3<u8>, target: u8) -> Option<f64> {
    debug_assert_eq!(pred.dim(), label.dim());

    let mut inter = 0u64;
    let mut pred_sum = 0u64;
    let mut truth_sum = 0u64;
    Zip::from(&pred).and(&label).for_each(|&p, &l| {
        let p = (p != 0) as u64;
        let t = (l == target) as u64;
        pred_sum += p;
        truth_sum += t;
        inter += p & t;
    });

    (truth_sum != 0).then(|| 2.0 * inter as f64 / (pred_sum + truth_sum) as f64)
}

/// 单个样本的逐 target Dice 得分表.
///
/// 下标 0 (背景) 恒为空; 真值缺失的 target 以 `None` 显式表示,
/// 而不是以 NaN 充当哨兵值. 该结构每个样本新建一份,
/// 打印均值后即可丢弃.
#[derive(Debug, Clone)]
pub struct DiceReport {
    scores: [Option<f64>; NUM_CLASSES],
}

impl DiceReport {
    /// 逐 target 对比分割结果与真值标注.
    pub fn evaluate(seg: &SegmentVolume, label: &CtLabel) -> Self {
        let mut scores = [None; NUM_CLASSES];
        for target in consts::all_targets() {
            scores[target as usize] = dice_score(seg.target_plane(target), label.data(), target);
        }
        Self { scores }
    }

    /// 直接从得分表构造. 下标 0 必须为空.
    pub fn from_scores(scores: [Option<f64>; NUM_CLASSES]) -> Self {
        debug_assert!(scores[0].is_none());
        Self { scores }
    }

    /// 某 target 的得分. `None` 代表该 target 在真值中缺失.
    #[inline]
    pub fn get(&self, target: u8) -> Option<f64> {
        self.scores[target as usize]
    }

    /// 按标签升序迭代所有可计分 target 及其得分.
    pub fn scorable(&self) -> impl Iterator<Item = (u8, f64)> + '_ {
        consts::all_targets().filter_map(|t| self.get(t).map(|d| (t, d)))
    }

    /// 可计分 target 得分的算术平均 (mDice).
    ///
    /// 当没有任何可计分 target 时返回 `None`, 调用方必须把这种情况
    /// 作为 "不可计分" 显式呈现, 而不是当作 0 分.
    pub fn mean(&self) -> Option<f64> {
        let mut count = 0u32;
        let mut sum = 0.0;
        for (_, dice) in self.scorable() {
            count += 1;
            sum += dice;
        }
        (count != 0).then(|| sum / f64::from(count))
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        /// 并发操作部分.
        impl DiceReport {
            /// 借助 `rayon`, 并行逐 target 对比分割结果与真值标注.
            pub fn par_evaluate(seg: &SegmentVolume, label: &CtLabel) -> Self {
                let computed: Vec<(u8, Option<f64>)> = consts::all_targets()
                    .collect::<Vec<_>>()
                    .into_par_iter()
                    .map(|t| (t, dice_score(seg.target_plane(t), label.data(), t)))
                    .collect();

                let mut scores = [None; NUM_CLASSES];
                for (t, dice) in computed {
                    scores[t as usize] = dice;
                }
                Self { scores }
            }
        }
    }
}
