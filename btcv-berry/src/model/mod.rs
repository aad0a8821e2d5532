//! 可提示分割模型边界.
//!
//! 评估主流程只依赖 [`SliceSegmenter`] trait; `onnx` feature
//! 提供基于 ONNX Runtime 的 SAM 后端实现.

use crate::prompt::SliceInput;
use ndarray::Array3;

cfg_if::cfg_if! {
    if #[cfg(feature = "onnx")] {
        mod onnx;
        pub use onnx::{LoadModelError, OnnxSam};
    }
}

/// 单张切片的推理输出.
#[derive(Debug, Clone)]
pub struct SliceOutput {
    /// 0/1 掩码, 形状为 (该切片请求的 target 数, H, W),
    /// 平面顺序与输入的 prompts 按位置对齐.
    pub masks: Array3<u8>,

    /// 每个掩码平面的预测 IoU 置信度, 与掩码平面按位置对齐.
    pub iou: Vec<f32>,
}

/// 推理运行时错误.
#[derive(Debug)]
pub enum SegmentError {
    /// 后端推理失败. 参数为后端给出的描述.
    Inference(String),

    /// 模型输出的掩码形状与切片不一致.
    ///
    /// 两个参数依次代表期望形状和实际形状的描述.
    OutputShape(String, String),
}

/// 按切片批推理的可提示分割模型.
///
/// 约定 (与调用方共同维护):
///
/// 1. 每个输入元素对应恰好一个输出元素, 顺序一致;
/// 2. 输出掩码平面与输入的 prompts 按位置对齐;
/// 3. 模型在多次调用之间不携带状态.
pub trait SliceSegmenter {
    /// 对一个 batch 的切片提示做一次完整推理.
    ///
    /// `multimask` 指示模型为每条提示产出多个候选掩码并择优,
    /// 关闭时每条提示只产出单个掩码.
    fn segment_batch(
        &mut self,
        batch: &[SliceInput],
        multimask: bool,
    ) -> Result<Vec<SliceOutput>, SegmentError>;

    /// 释放一个 slice range 处理完毕后遗留的临时缓冲.
    ///
    /// 无论该 range 是否实际发生了推理, 调用方都应在 range
    /// 结束时调用一次, 以约束长体数据上的峰值内存.
    fn release_transients(&mut self) {}
}
