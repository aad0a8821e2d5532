//! 分割结果的叠加可视化.
//!
//! 仅作诊断用途: 失败不应影响评估主流程, 由调用方记录日志后继续.

use crate::consts::NUM_CLASSES;
use crate::CtWindow;
use image::{ImageResult, Rgb, RgbImage};
use ndarray::{ArrayView2, ArrayView3, Axis};
use once_cell::sync::Lazy;
use std::path::Path;

/// 每个类别一个可区分颜色的查找表. 下标 0 预留给背景, 恒为黑色.
static CLASS_COLORS: Lazy<[[u8; 3]; NUM_CLASSES]> = Lazy::new(|| {
    let mut lut = [[0u8; 3]; NUM_CLASSES];
    for (i, color) in lut.iter_mut().enumerate().skip(1) {
        *color = hue_to_rgb((i - 1) as f32 / (NUM_CLASSES - 1) as f32 * 300.0);
    }
    lut
});

/// 类别对应的叠加颜色.
#[inline]
pub fn class_color(target: u8) -> [u8; 3] {
    CLASS_COLORS[target as usize]
}

/// 色相 (角度制, 0 <= hue <= 360) 转全饱和度全亮度 RGB.
fn hue_to_rgb(hue: f32) -> [u8; 3] {
    let h = (hue / 60.0) % 6.0;
    let x = ((1.0 - (h % 2.0 - 1.0).abs()) * 255.0) as u8;
    match h as u32 {
        0 => [255, x, 0],
        1 => [x, 255, 0],
        2 => [0, 255, x],
        3 => [0, x, 255],
        4 => [x, 0, 255],
        _ => [255, 0, x],
    }
}

/// 将各 target 掩码以类别颜色叠加到窗口化的灰度底图上.
///
/// `image` 为 HU 切片 (高, 宽); `masks` 形状为 (target 数, 高, 宽) 的
/// 0/1 掩码, `targets` 给出每个掩码平面对应的类别标签, 两者按位置对齐.
pub fn render_overlay(
    image: ArrayView2<f32>,
    masks: ArrayView3<u8>,
    targets: &[u8],
    window: &CtWindow,
) -> RgbImage {
    let (height, width) = image.dim();
    debug_assert_eq!(masks.dim().1, height);
    debug_assert_eq!(masks.dim().2, width);
    debug_assert_eq!(masks.dim().0, targets.len());

    let mut buf = RgbImage::new(width as u32, height as u32);
    for ((h, w), &hu) in image.indexed_iter() {
        let gray = window.eval(hu).unwrap_or(u8::MIN);
        buf.put_pixel(w as u32, h as u32, Rgb([gray, gray, gray]));
    }
    for (i, &target) in targets.iter().enumerate() {
        let color = Rgb(class_color(target));
        for ((h, w), &m) in masks.index_axis(Axis(0), i).indexed_iter() {
            if m != 0 {
                buf.put_pixel(w as u32, h as u32, color);
            }
        }
    }
    buf
}

/// 渲染并保存到 `path`. 一次调用写一个文件.
pub fn save_overlay<P: AsRef<Path>>(
    image: ArrayView2<f32>,
    masks: ArrayView3<u8>,
    targets: &[u8],
    window: &CtWindow,
    path: P,
) -> ImageResult<()> {
    render_overlay(image, masks, targets, window).save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::all_targets;
    use ndarray::{Array2, Array3};
    use std::collections::HashSet;

    #[test]
    fn test_colors_distinct() {
        assert_eq!(class_color(0), [0, 0, 0]);
        let colors: HashSet<[u8; 3]> = all_targets().map(class_color).collect();
        assert_eq!(colors.len(), 13);
        assert!(!colors.contains(&[0, 0, 0]));
    }

    #[test]
    fn test_overlay_pixels() {
        // 2x2 切片, 左上角被 target 5 覆盖.
        let image = Array2::<f32>::from_elem((2, 2), 1e4); // 窗口上限以上, 底图纯白
        let mut masks = Array3::<u8>::zeros((1, 2, 2));
        masks[(0, 0, 0)] = 1;
        let window = CtWindow::from_soft_tissue_visual();

        let buf = render_overlay(image.view(), masks.view(), &[5], &window);
        assert_eq!(buf.dimensions(), (2, 2));
        assert_eq!(buf.get_pixel(0, 0).0, class_color(5));
        assert_eq!(buf.get_pixel(1, 0).0, [255, 255, 255]);
        assert_eq!(buf.get_pixel(0, 1).0, [255, 255, 255]);
    }
}
