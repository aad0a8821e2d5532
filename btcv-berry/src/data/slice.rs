use crate::consts::{organ, NUM_CLASSES};
use crate::Idx2d;
use ndarray::iter::{IndexedIter, Iter};
use ndarray::{Array2, ArrayView2, Ix2};
use std::ops::Index;

/// 标签切片上某 target 的包围盒, 以像素坐标闭区间表示.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BBox {
    /// 高方向最小下标.
    pub h_min: usize,

    /// 宽方向最小下标.
    pub w_min: usize,

    /// 高方向最大下标.
    pub h_max: usize,

    /// 宽方向最大下标.
    pub w_max: usize,
}

impl BBox {
    /// 向四周扩展 `margin` 个像素, 并收缩到 `(h, w)` 形状切片的合法下标范围内.
    pub fn expanded(&self, margin: usize, (h, w): Idx2d) -> BBox {
        debug_assert!(self.h_max < h && self.w_max < w);
        BBox {
            h_min: self.h_min.saturating_sub(margin),
            w_min: self.w_min.saturating_sub(margin),
            h_max: (self.h_max + margin).min(h - 1),
            w_max: (self.w_max + margin).min(w - 1),
        }
    }
}

/// 不可变、借用的二维水平 CT 标签切片.
pub struct LabelSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::CtLabel`].
    ///
    /// 这里有意把类型写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, u8>,
}

/// 不可变、借用的二维水平 CT 扫描切片. 像素为 HU 值.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::CtScan`].
    data: ArrayView2<'a, f32>,
}

/// 不可变方法集合.
macro_rules! impl_slice_immut {
    ($life: lifetime, $slice: ty, $elem: ty) => {
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: ArrayView2<$life, $elem>) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<$elem> {
                self.data.view()
            }

            /// 获取可以迭代切片像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, $elem, Ix2> {
                self.data.iter()
            }

            /// 获取可以按 (下标, 像素) 迭代切片的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> IndexedIter<'_, $elem, Ix2> {
                self.data.indexed_iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&$elem> {
                self.data.get(pos)
            }

            /// 切片形状 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 切片像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                self.data.len()
            }
        }

        impl<$life> Index<Idx2d> for $slice {
            type Output = $elem;

            #[inline]
            fn index(&self, index: Idx2d) -> &Self::Output {
                &self.data[index]
            }
        }
    };
}

impl_slice_immut!('a, LabelSlice<'a>, u8);
impl_slice_immut!('a, ScanSlice<'a>, f32);

impl ScanSlice<'_> {
    /// 获得切片数据的一份 owned 深拷贝.
    #[inline]
    pub fn to_owned_array(&self) -> Array2<f32> {
        self.data.to_owned()
    }
}

impl LabelSlice<'_> {
    /// 切片是否为全背景?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.iter().all(|&p| organ::is_background(p))
    }

    /// 统计切片中值为 `label` 的像素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.iter().filter(|&&p| p == label).count()
    }

    /// 按升序收集切片上出现过的全部器官标签.
    pub fn present_targets(&self) -> Vec<u8> {
        let mut seen = [false; NUM_CLASSES];
        for &p in self.iter() {
            debug_assert!((p as usize) < NUM_CLASSES, "非法标签值 `{p}`");
            seen[p as usize] = true;
        }
        (1..NUM_CLASSES as u8)
            .filter(|&t| seen[t as usize])
            .collect()
    }

    /// 收集值为 `target` 的所有像素下标, 按行优先存储.
    pub fn target_positions(&self, target: u8) -> Vec<Idx2d> {
        self.indexed_iter()
            .filter_map(|(pos, &p)| (p == target).then_some(pos))
            .collect()
    }

    /// 值为 `target` 的像素质心, 四舍五入到最近的像素下标.
    ///
    /// 当 target 不在切片上时返回 `None`. 注意对于凹形区域,
    /// 质心像素本身不一定落在区域内部.
    pub fn centroid(&self, target: u8) -> Option<Idx2d> {
        let mut count = 0usize;
        let (mut sum_h, mut sum_w) = (0usize, 0usize);
        for ((h, w), &p) in self.indexed_iter() {
            if p == target {
                count += 1;
                sum_h += h;
                sum_w += w;
            }
        }
        if count == 0 {
            return None;
        }
        let round = |sum: usize| (sum as f64 / count as f64).round() as usize;
        Some((round(sum_h), round(sum_w)))
    }

    /// 值为 `target` 的像素包围盒. 当 target 不在切片上时返回 `None`.
    pub fn bbox(&self, target: u8) -> Option<BBox> {
        let mut ans: Option<BBox> = None;
        for ((h, w), &p) in self.indexed_iter() {
            if p != target {
                continue;
            }
            match ans.as_mut() {
                None => {
                    ans = Some(BBox {
                        h_min: h,
                        w_min: w,
                        h_max: h,
                        w_max: w,
                    })
                }
                Some(b) => {
                    b.h_min = b.h_min.min(h);
                    b.w_min = b.w_min.min(w);
                    b.h_max = b.h_max.max(h);
                    b.w_max = b.w_max.max(w);
                }
            }
        }
        ans
    }

    /// 值为 `target` 的像素构成的 0/1 掩码.
    #[inline]
    pub fn target_mask(&self, target: u8) -> Array2<u8> {
        self.data.mapv(|p| (p == target) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn demo() -> Array2<u8> {
        array![
            [0, 0, 0, 0, 0],
            [0, 5, 5, 0, 0],
            [0, 5, 5, 0, 2],
            [0, 0, 0, 0, 0],
        ]
    }

    #[test]
    fn test_present_targets() {
        let data = demo();
        let sli = LabelSlice::new(data.view());
        assert_eq!(sli.present_targets(), vec![2, 5]);
        assert!(!sli.is_background());
        assert_eq!(sli.count(5), 4);
        assert_eq!(sli.count(2), 1);
        assert_eq!(sli.count(7), 0);

        let empty = Array2::<u8>::zeros((3, 3));
        let sli = LabelSlice::new(empty.view());
        assert!(sli.is_background());
        assert!(sli.present_targets().is_empty());
    }

    #[test]
    fn test_centroid_and_positions() {
        let data = demo();
        let sli = LabelSlice::new(data.view());
        assert_eq!(sli.target_positions(2), vec![(2, 4)]);
        assert_eq!(sli.centroid(5), Some((2, 2))); // 平均 (1.5, 1.5), 四舍五入
        assert_eq!(sli.centroid(2), Some((2, 4)));
        assert_eq!(sli.centroid(9), None);
    }

    #[test]
    fn test_bbox() {
        let data = demo();
        let sli = LabelSlice::new(data.view());
        let b = sli.bbox(5).unwrap();
        assert_eq!((b.h_min, b.w_min, b.h_max, b.w_max), (1, 1, 2, 2));
        assert_eq!(sli.bbox(9), None);

        // margin 扩展在边界处收缩.
        let grown = b.expanded(2, sli.shape());
        assert_eq!((grown.h_min, grown.w_min), (0, 0));
        assert_eq!((grown.h_max, grown.w_max), (3, 4));
    }

    #[test]
    fn test_target_mask() {
        let data = demo();
        let sli = LabelSlice::new(data.view());
        let mask = sli.target_mask(5);
        assert_eq!(mask.sum(), 4);
        assert_eq!(mask[(1, 1)], 1);
        assert_eq!(mask[(2, 4)], 0);
    }
}
