//! 基于 ONNX Runtime 的 SAM encoder/decoder 推理后端.
//!
//! 约定模型以官方导出格式提供: encoder 输入 `images`
//! (1, 3, 1024, 1024), 输出 `embeddings`; decoder 按
//! `image_embeddings` / `point_coords` / `point_labels` /
//! `mask_input` / `has_mask_input` / `orig_im_size` 取入参,
//! 输出原图尺寸的 `masks` logits 与 `iou_predictions`.

use super::{SegmentError, SliceOutput, SliceSegmenter};
use crate::prompt::{SliceInput, SlicePrompt};
use crate::{CtWindow, Idx2d};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::{Array2, Array3, Axis};
use ordered_float::OrderedFloat;
use ort::{inputs, GraphOptimizationLevel, Session, Tensor};
use std::path::{Path, PathBuf};

/// SAM 模型输入边长.
const SAM_INPUT_SIZE: usize = 1024;

/// SAM 官方图像归一化均值 (RGB).
const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];

/// SAM 官方图像归一化标准差 (RGB).
const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// decoder 低分辨率掩码输入边长.
const LOW_RES_SIZE: usize = 256;

/// 掩码 logits 的二值化阈值.
const MASK_THRESHOLD: f32 = 0.0;

/// decoder 点标签: 前景点.
const LABEL_FOREGROUND: f32 = 1.0;
/// decoder 点标签: 包围盒左上角.
const LABEL_BOX_TOP_LEFT: f32 = 2.0;
/// decoder 点标签: 包围盒右下角.
const LABEL_BOX_BOTTOM_RIGHT: f32 = 3.0;
/// decoder 点标签: 无框时的填充点.
const LABEL_PADDING: f32 = -1.0;

/// 加载模型错误.
#[derive(Debug)]
pub enum LoadModelError {
    /// checkpoint 文件不存在.
    MissingCheckpoint(PathBuf),

    /// 底层 onnxruntime 错误.
    Ort(ort::Error),
}

/// encoder 产出的图像 embedding, 以 (形状, 数据) 的原始形式暂存,
/// 供同一切片的多条提示复用.
struct Embedding {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// 基于 ONNX Runtime 的 SAM 推理后端.
pub struct OnnxSam {
    encoder: Session,
    decoder: Session,
    window: CtWindow,

    /// encoder 输入张量的复用缓冲. 每个 range 结束后由
    /// [`SliceSegmenter::release_transients`] 释放.
    scratch: Vec<f32>,
}

impl OnnxSam {
    /// 从两个 onnx checkpoint 加载 encoder/decoder 会话.
    ///
    /// 任一文件缺失或会话创建失败都是启动期配置错误.
    pub fn load<P: AsRef<Path>>(
        encoder: P,
        decoder: P,
        intra_threads: usize,
    ) -> Result<Self, LoadModelError> {
        Ok(Self {
            encoder: load_session(encoder.as_ref(), intra_threads)?,
            decoder: load_session(decoder.as_ref(), intra_threads)?,
            window: CtWindow::from_soft_tissue_visual(),
            scratch: Vec::new(),
        })
    }

    /// 替换 HU 窗口化参数.
    #[must_use]
    pub fn with_window(mut self, window: CtWindow) -> Self {
        self.window = window;
        self
    }

    /// 单张切片: 一次 encoder 前向 + 每条提示一次 decoder 前向.
    fn segment_slice(
        &mut self,
        input: &SliceInput,
        multimask: bool,
    ) -> Result<SliceOutput, SegmentError> {
        let orig = input.image.dim();
        let resized = preprocess_shape(orig.0, orig.1, SAM_INPUT_SIZE);

        let embedding = self
            .encode(&input.image, resized)
            .map_err(|e| SegmentError::Inference(e.to_string()))?;

        let mut masks = Array3::<u8>::zeros((input.prompts.len(), orig.0, orig.1));
        let mut iou = Vec::with_capacity(input.prompts.len());
        for (i, tp) in input.prompts.iter().enumerate() {
            let (mask, score) = self
                .decode(&embedding, &tp.prompt, orig, resized, multimask)
                .map_err(|e| SegmentError::Inference(e.to_string()))?;
            if mask.dim() != orig {
                return Err(SegmentError::OutputShape(
                    format!("{orig:?}"),
                    format!("{:?}", mask.dim()),
                ));
            }
            masks.index_axis_mut(Axis(0), i).assign(&mask);
            iou.push(score);
        }
        Ok(SliceOutput { masks, iou })
    }

    /// HU 切片 -> 窗口化灰度 -> longest-side 1024 缩放 ->
    /// 三通道归一化 CHW, 右下零填充 -> encoder 前向.
    fn encode(&mut self, image: &Array2<f32>, resized: Idx2d) -> ort::Result<Embedding> {
        let (orig_h, orig_w) = image.dim();
        let mut gray = GrayImage::new(orig_w as u32, orig_h as u32);
        for ((h, w), &hu) in image.indexed_iter() {
            let v = self.window.eval(hu).unwrap_or(u8::MIN);
            gray.put_pixel(w as u32, h as u32, image::Luma([v]));
        }
        let (new_h, new_w) = resized;
        let scaled = imageops::resize(&gray, new_w as u32, new_h as u32, FilterType::Lanczos3);

        // 归一化后右/下方的填充区保持 0.
        self.scratch.clear();
        self.scratch
            .resize(3 * SAM_INPUT_SIZE * SAM_INPUT_SIZE, 0.0);
        for channel in 0..3usize {
            let base = channel * SAM_INPUT_SIZE * SAM_INPUT_SIZE;
            let (mean, std) = (PIXEL_MEAN[channel], PIXEL_STD[channel]);
            for (x, y, pixel) in scaled.enumerate_pixels() {
                self.scratch[base + y as usize * SAM_INPUT_SIZE + x as usize] =
                    (f32::from(pixel.0[0]) - mean) / std;
            }
        }

        let images = Tensor::from_array((
            [1usize, 3, SAM_INPUT_SIZE, SAM_INPUT_SIZE],
            self.scratch.clone(),
        ))?;
        let outputs = self.encoder.run(inputs!["images" => images]?)?;
        let (shape, data) = outputs["embeddings"].try_extract_raw_tensor::<f32>()?;
        Ok(Embedding {
            shape: shape.iter().map(|&d| d as usize).collect(),
            data: data.to_vec(),
        })
    }

    /// 单条提示的 decoder 前向. 返回原图尺寸的 0/1 掩码与其预测 IoU.
    fn decode(
        &mut self,
        embedding: &Embedding,
        prompt: &SlicePrompt,
        orig: Idx2d,
        resized: Idx2d,
        multimask: bool,
    ) -> ort::Result<(Array2<u8>, f32)> {
        let (coords, labels) = prompt_points(prompt, orig, resized);
        let n_points = labels.len();

        let image_embeddings =
            Tensor::from_array((embedding.shape.clone(), embedding.data.clone()))?;
        let point_coords = Tensor::from_array(([1usize, n_points, 2], coords))?;
        let point_labels = Tensor::from_array(([1usize, n_points], labels))?;
        let mask_input = Tensor::from_array((
            [1usize, 1, LOW_RES_SIZE, LOW_RES_SIZE],
            vec![0f32; LOW_RES_SIZE * LOW_RES_SIZE],
        ))?;
        let has_mask_input = Tensor::from_array(([1usize], vec![0f32]))?;
        let orig_im_size = Tensor::from_array(([2usize], vec![orig.0 as f32, orig.1 as f32]))?;

        let outputs = self.decoder.run(inputs![
            "image_embeddings" => image_embeddings,
            "point_coords" => point_coords,
            "point_labels" => point_labels,
            "mask_input" => mask_input,
            "has_mask_input" => has_mask_input,
            "orig_im_size" => orig_im_size,
        ]?)?;

        let (mask_shape, mask_data) = outputs["masks"].try_extract_raw_tensor::<f32>()?;
        let (_, iou_data) = outputs["iou_predictions"].try_extract_raw_tensor::<f32>()?;

        // [1, C, H, W]: multimask 导出时 C > 1, 按预测 IoU 择优.
        let channels = mask_shape[1] as usize;
        let h = mask_shape[2] as usize;
        let w = mask_shape[3] as usize;
        let best = if multimask && channels > 1 {
            (0..channels)
                .max_by_key(|&c| OrderedFloat(iou_data[c]))
                .unwrap()
        } else {
            0
        };

        let plane = &mask_data[best * h * w..(best + 1) * h * w];
        let mut mask = Array2::<u8>::zeros((h, w));
        for (dst, &logit) in mask.iter_mut().zip(plane) {
            *dst = (logit > MASK_THRESHOLD) as u8;
        }
        Ok((mask, iou_data[best]))
    }
}

impl SliceSegmenter for OnnxSam {
    fn segment_batch(
        &mut self,
        batch: &[SliceInput],
        multimask: bool,
    ) -> Result<Vec<SliceOutput>, SegmentError> {
        let mut outputs = Vec::with_capacity(batch.len());
        for input in batch {
            outputs.push(self.segment_slice(input, multimask)?);
        }
        Ok(outputs)
    }

    fn release_transients(&mut self) {
        self.scratch = Vec::new();
    }
}

/// 创建单个 onnxruntime 会话.
fn load_session(path: &Path, intra_threads: usize) -> Result<Session, LoadModelError> {
    if !path.is_file() {
        return Err(LoadModelError::MissingCheckpoint(path.to_owned()));
    }
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.with_intra_threads(intra_threads))
        .and_then(|b| b.commit_from_file(path))
        .map_err(LoadModelError::Ort)
}

/// 求 longest-side 缩放后的目标形状 (高, 宽).
fn preprocess_shape(old_h: usize, old_w: usize, long_side: usize) -> Idx2d {
    let scale = long_side as f32 / old_h.max(old_w) as f32;
    (
        (old_h as f32 * scale + 0.5) as usize,
        (old_w as f32 * scale + 0.5) as usize,
    )
}

/// 将提示展开成 decoder 的 (x, y) 坐标序列与标签序列.
///
/// 坐标按缩放比例映射到模型输入空间; 无包围盒时按 SAM
/// 导出约定补一个 (0, 0) 填充点.
fn prompt_points(
    prompt: &SlicePrompt,
    (orig_h, orig_w): Idx2d,
    (new_h, new_w): Idx2d,
) -> (Vec<f32>, Vec<f32>) {
    let sx = new_w as f32 / orig_w as f32;
    let sy = new_h as f32 / orig_h as f32;

    let mut coords = Vec::with_capacity(6);
    let mut labels = Vec::with_capacity(3);
    if let Some((h, w)) = prompt.point {
        coords.push(w as f32 * sx);
        coords.push(h as f32 * sy);
        labels.push(LABEL_FOREGROUND);
    }
    match &prompt.bbox {
        Some(b) => {
            coords.push(b.w_min as f32 * sx);
            coords.push(b.h_min as f32 * sy);
            labels.push(LABEL_BOX_TOP_LEFT);
            coords.push(b.w_max as f32 * sx);
            coords.push(b.h_max as f32 * sy);
            labels.push(LABEL_BOX_BOTTOM_RIGHT);
        }
        None => {
            coords.push(0.0);
            coords.push(0.0);
            labels.push(LABEL_PADDING);
        }
    }
    (coords, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BBox;

    #[test]
    fn test_preprocess_shape_longest_side() {
        assert_eq!(preprocess_shape(512, 512, 1024), (1024, 1024));
        assert_eq!(preprocess_shape(512, 256, 1024), (1024, 512));
        assert_eq!(preprocess_shape(100, 400, 1024), (256, 1024));
    }

    #[test]
    fn test_prompt_points_point_only() {
        let prompt = SlicePrompt {
            point: Some((10, 20)),
            bbox: None,
        };
        let (coords, labels) = prompt_points(&prompt, (512, 512), (1024, 1024));
        // 前景点 + 填充点.
        assert_eq!(labels, vec![LABEL_FOREGROUND, LABEL_PADDING]);
        assert_eq!(coords, vec![40.0, 20.0, 0.0, 0.0]);
    }

    #[test]
    fn test_prompt_points_with_bbox() {
        let prompt = SlicePrompt {
            point: None,
            bbox: Some(BBox {
                h_min: 4,
                w_min: 8,
                h_max: 12,
                w_max: 16,
            }),
        };
        let (coords, labels) = prompt_points(&prompt, (256, 256), (1024, 1024));
        assert_eq!(labels, vec![LABEL_BOX_TOP_LEFT, LABEL_BOX_BOTTOM_RIGHT]);
        assert_eq!(coords, vec![32.0, 16.0, 64.0, 48.0]);
    }
}
