//! 样本评估主循环.

use crate::report;
use btcv_berry::dataset::SampleLoader;
use btcv_berry::eval::dice::DiceReport;
use btcv_berry::eval::{assemble_range, empty_range, slice_ranges, SegmentVolume};
use btcv_berry::model::{SegmentError, SliceOutput, SliceSegmenter};
use btcv_berry::prompt::{PromptBuilder, SliceInput, UsedTargets};
use btcv_berry::{CtData3d, NiftiHeaderAttr};
use std::path::PathBuf;

/// 主循环可调参数.
pub struct RunOptions {
    /// 每个 slice range 的切片数.
    pub batch_size: usize,

    /// 叠加图输出目录. `None` 时关闭可视化.
    pub visualize: Option<PathBuf>,

    /// 本次运行最多写出的叠加图数量.
    pub visualize_limit: usize,

    /// 只评估第一个样本 (调试用).
    pub first_sample_only: bool,
}

/// 运行总结.
pub struct RunSummary {
    /// 成功产出报告的样本数.
    pub evaluated: usize,

    /// 加载或推理失败的样本数.
    pub failed: usize,
}

/// 对加载器给出的每个样本依次评估并打印报告.
///
/// 单个样本的加载或推理失败只会使该样本被标记为失败并告警,
/// 不影响后续样本, 循环继续.
pub fn run<M: SliceSegmenter>(
    model: &mut M,
    builder: &mut PromptBuilder,
    loader: SampleLoader,
    opts: &RunOptions,
) -> RunSummary {
    let mut summary = RunSummary {
        evaluated: 0,
        failed: 0,
    };
    let mut visualized = 0usize;

    for (idx, data) in loader {
        let data = match data {
            Ok(d) => d,
            Err(e) => {
                log::warn!("sample {idx}: cannot load: {e}");
                summary.failed += 1;
                continue;
            }
        };

        println!("Sample {idx}:");
        match evaluate_sample(model, builder, &data, opts, &mut visualized) {
            Ok(dice) => {
                report::print_report(&dice);
                summary.evaluated += 1;
            }
            Err(e) => {
                log::warn!("sample {idx}: inference failed: {e:?}");
                summary.failed += 1;
            }
        }

        if opts.first_sample_only {
            break;
        }
    }
    summary
}

/// 评估单个样本: 逐 range 推理, 重组 3D 结果, 计算逐 target Dice.
///
/// 空 batch 的 range 直接零填充, 不触碰模型; 无论哪条路径,
/// 每个 range 结束时都会调用一次 `release_transients`.
pub fn evaluate_sample<M: SliceSegmenter>(
    model: &mut M,
    builder: &mut PromptBuilder,
    data: &CtData3d,
    opts: &RunOptions,
    visualized: &mut usize,
) -> Result<DiceReport, SegmentError> {
    let slice_shape = data.label.slice_shape();
    let mut parts = Vec::new();

    for range in slice_ranges(data.len_z(), opts.batch_size) {
        let (used, batch) = builder.prepare_range(&data.scan, &data.label, range.clone());
        if batch.is_empty() {
            parts.push(empty_range(slice_shape, range.len()));
            model.release_transients();
            continue;
        }

        let output = model.segment_batch(&batch, false);
        model.release_transients();
        let output = output?;

        maybe_visualize(&batch, &used, &output, opts, visualized);
        parts.push(assemble_range(slice_shape, range, &used, &output));
    }

    let seg = SegmentVolume::from_parts(slice_shape, parts);
    Ok(DiceReport::evaluate(&seg, &data.label))
}

/// 将本 range 第一张切片的叠加图写盘. 写盘失败只告警, 不中断评估.
fn maybe_visualize(
    batch: &[SliceInput],
    used: &[UsedTargets],
    output: &[SliceOutput],
    opts: &RunOptions,
    visualized: &mut usize,
) {
    let Some(dir) = &opts.visualize else {
        return;
    };
    if *visualized >= opts.visualize_limit {
        return;
    }

    let (input, ut, out) = (&batch[0], &used[0], &output[0]);
    let path = dir.join(format!("seg_result_{}.png", *visualized));
    let window = utils::abdomen_window();
    match btcv_berry::vis::save_overlay(
        input.image.view(),
        out.masks.view(),
        &ut.targets,
        &window,
        &path,
    ) {
        Ok(()) => *visualized += 1,
        Err(e) => log::warn!("cannot write overlay {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btcv_berry::model::{SegmentError, SliceOutput, SliceSegmenter};
    use btcv_berry::prompt::{PointKind, PromptConfig, SliceInput};
    use btcv_berry::{CtData3d, CtLabel, CtScan};
    use ndarray::{Array3, Axis};

    /// 以真值为输出的理想模型, 同时记录各回调次数.
    struct Oracle {
        label: CtLabel,
        batch_calls: usize,
        release_calls: usize,
    }

    impl Oracle {
        fn new(label: CtLabel) -> Self {
            Self {
                label,
                batch_calls: 0,
                release_calls: 0,
            }
        }
    }

    impl SliceSegmenter for Oracle {
        fn segment_batch(
            &mut self,
            batch: &[SliceInput],
            _multimask: bool,
        ) -> Result<Vec<SliceOutput>, SegmentError> {
            self.batch_calls += 1;
            Ok(batch
                .iter()
                .map(|input| {
                    let sli = self.label.slice_at(input.z);
                    let (h, w) = sli.shape();
                    let mut masks = Array3::<u8>::zeros((input.prompts.len(), h, w));
                    for (i, tp) in input.prompts.iter().enumerate() {
                        masks
                            .index_axis_mut(Axis(0), i)
                            .assign(&sli.target_mask(tp.target));
                    }
                    let iou = vec![1.0; input.prompts.len()];
                    SliceOutput { masks, iou }
                })
                .collect())
        }

        fn release_transients(&mut self) {
            self.release_calls += 1;
        }
    }

    /// 一切调用都失败的模型.
    struct Broken;

    impl SliceSegmenter for Broken {
        fn segment_batch(
            &mut self,
            _batch: &[SliceInput],
            _multimask: bool,
        ) -> Result<Vec<SliceOutput>, SegmentError> {
            Err(SegmentError::Inference("out of memory".to_string()))
        }
    }

    fn center_builder() -> PromptBuilder {
        let config = PromptConfig {
            point: Some(PointKind::Center),
            bbox: false,
            margin: 0,
            target: None,
        };
        PromptBuilder::new(config, 42).unwrap()
    }

    fn opts(batch_size: usize) -> RunOptions {
        RunOptions {
            batch_size,
            visualize: None,
            visualize_limit: 0,
            first_sample_only: false,
        }
    }

    /// (4, 4, 3) 样本, 仅 z=1 上有 target 5.
    fn single_organ_sample() -> CtData3d {
        let mut label = Array3::<u8>::zeros((4, 4, 3));
        label[(1, 1, 1)] = 5;
        label[(1, 2, 1)] = 5;
        label[(2, 1, 1)] = 5;
        CtData3d {
            scan: CtScan::fake(Array3::zeros((4, 4, 3))),
            label: CtLabel::fake(label),
        }
    }

    #[test]
    fn test_end_to_end_single_organ() {
        let data = single_organ_sample();
        let mut model = Oracle::new(data.label.clone());
        let mut builder = center_builder();

        // batch_size = 2 -> ranges [0, 2) 与 [2, 3);
        // 前者含器官触发一次推理, 后者走零填充路径.
        let report =
            evaluate_sample(&mut model, &mut builder, &data, &opts(2), &mut 0).unwrap();

        assert_eq!(model.batch_calls, 1);
        assert_eq!(model.release_calls, 2);
        assert_eq!(report.get(5), Some(1.0));
        for t in btcv_berry::consts::all_targets().filter(|&t| t != 5) {
            assert_eq!(report.get(t), None);
        }
        assert_eq!(report.mean(), Some(1.0));
    }

    #[test]
    fn test_all_background_sample_not_scorable() {
        let data = CtData3d {
            scan: CtScan::fake(Array3::zeros((4, 4, 2))),
            label: CtLabel::fake(Array3::zeros((4, 4, 2))),
        };
        let mut model = Oracle::new(data.label.clone());
        let mut builder = center_builder();

        let report =
            evaluate_sample(&mut model, &mut builder, &data, &opts(1), &mut 0).unwrap();

        // 模型从未被调用, 每个 range 仍然释放一次缓冲.
        assert_eq!(model.batch_calls, 0);
        assert_eq!(model.release_calls, 2);
        assert_eq!(report.mean(), None);
    }

    #[test]
    fn test_model_failure_propagates() {
        let data = single_organ_sample();
        let mut builder = center_builder();
        let r = evaluate_sample(&mut Broken, &mut builder, &data, &opts(2), &mut 0);
        assert!(matches!(r, Err(SegmentError::Inference(_))));
    }
}
