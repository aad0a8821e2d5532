//! 提示构造.
//!
//! 对一个 slice range 内的每张切片, 为其上出现的每个器官 target
//! 构造一条空间提示 (点或包围盒), 并打包成模型可直接消费的 batch.
//! 随机性全部来源于显式传入的种子, 不读写任何进程级全局状态.

use crate::consts::organ;
use crate::{BBox, CtLabel, CtScan, Idx2d, LabelSlice, NiftiHeaderAttr};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::ops::Range;

/// 点提示的取点方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PointKind {
    /// target 区域质心.
    Center,

    /// target 区域内均匀随机取一个像素.
    Random,
}

/// 提示构造配置.
#[derive(Clone, Debug)]
pub struct PromptConfig {
    /// 点提示方式. `None` 代表不使用点提示.
    pub point: Option<PointKind>,

    /// 是否附带包围盒提示.
    pub bbox: bool,

    /// 包围盒向四周扩展的像素数.
    pub margin: usize,

    /// 只为该 target 构造提示. `None` 代表全部 13 个器官.
    pub target: Option<u8>,
}

/// 提示配置错误.
#[derive(Debug)]
pub enum PromptConfigError {
    /// 点提示与包围盒提示均未启用.
    NoPrompt,

    /// 器官过滤标签超出 1..=13.
    ///
    /// 参数代表非法的标签值.
    BadTarget(u8),
}

impl PromptConfig {
    /// 校验配置自身的一致性.
    pub fn validate(&self) -> Result<(), PromptConfigError> {
        if self.point.is_none() && !self.bbox {
            return Err(PromptConfigError::NoPrompt);
        }
        if let Some(t) = self.target {
            if !organ::is_organ(t) {
                return Err(PromptConfigError::BadTarget(t));
            }
        }
        Ok(())
    }
}

/// 启动时打印的提示配置横幅.
impl fmt::Display for PromptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prompt: ")?;
        match self.point {
            Some(PointKind::Center) => write!(f, "center point")?,
            Some(PointKind::Random) => write!(f, "random point")?,
            None => write!(f, "no point")?,
        }
        if self.bbox {
            write!(f, ", bounding box (margin {})", self.margin)?;
        }
        match self.target {
            Some(t) => write!(f, ", target {} ({})", t, organ::name(t)),
            None => write!(f, ", all targets"),
        }
    }
}

/// 单个 (切片, target) 的空间提示.
#[derive(Clone, Debug)]
pub struct SlicePrompt {
    /// 前景点 (高, 宽). 启用点提示时必有.
    pub point: Option<Idx2d>,

    /// 包围盒. 启用包围盒提示时必有.
    pub bbox: Option<BBox>,
}

/// 一张切片上, 某个 target 及其提示.
#[derive(Clone, Debug)]
pub struct TargetPrompt {
    /// 器官类别标签.
    pub target: u8,

    /// 对应的空间提示.
    pub prompt: SlicePrompt,
}

/// 一张切片的 z 下标与其上出现的 target 集合.
///
/// `targets` 升序且不重复, 与同一下标处 [`SliceInput::prompts`]
/// 的平面顺序一一对应.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UsedTargets {
    /// 切片 z 下标.
    pub z: usize,

    /// 该切片上出现的器官标签, 升序.
    pub targets: Vec<u8>,
}

/// 等待推理的单张切片输入.
#[derive(Clone, Debug)]
pub struct SliceInput {
    /// 切片 z 下标.
    pub z: usize,

    /// 切片 HU 数据 (高, 宽).
    pub image: Array2<f32>,

    /// 该切片的全部提示, 与 [`UsedTargets::targets`] 按位置对齐.
    pub prompts: Vec<TargetPrompt>,
}

/// 提示构造器. 持有配置与显式种子初始化的随机数发生器.
pub struct PromptBuilder {
    config: PromptConfig,
    rng: StdRng,
}

impl PromptBuilder {
    /// 校验配置并初始化. 随机点提示的取点完全由 `seed` 决定.
    pub fn new(config: PromptConfig, seed: u64) -> Result<Self, PromptConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// 当前配置.
    #[inline]
    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// 为 `z_range` 内的每张切片构造提示与模型输入.
    ///
    /// 返回的两个序列按位置一一对应, 且 z 严格递增; 没有任何器官的切片
    /// 不产生条目. 两个序列同时为空代表该 range 无需推理.
    ///
    /// 当 `z_range` 越界或扫描与标注形状不一致时 panic.
    pub fn prepare_range(
        &mut self,
        scan: &CtScan,
        label: &CtLabel,
        z_range: Range<usize>,
    ) -> (Vec<UsedTargets>, Vec<SliceInput>) {
        assert_eq!(scan.shape(), label.shape(), "CT 扫描和标注形状不一致");
        assert!(z_range.end <= label.len_z());

        let mut used = Vec::new();
        let mut batch = Vec::new();
        for z in z_range {
            let sli = label.slice_at(z);
            let targets = match self.config.target {
                Some(t) => {
                    if sli.count(t) > 0 {
                        vec![t]
                    } else {
                        Vec::new()
                    }
                }
                None => sli.present_targets(),
            };
            if targets.is_empty() {
                continue;
            }

            let prompts = targets
                .iter()
                .map(|&t| TargetPrompt {
                    target: t,
                    prompt: self.build_prompt(&sli, t),
                })
                .collect();
            batch.push(SliceInput {
                z,
                image: scan.slice_at(z).to_owned_array(),
                prompts,
            });
            used.push(UsedTargets { z, targets });
        }
        (used, batch)
    }

    /// 为切片上已确认存在的 `target` 构造一条提示.
    fn build_prompt(&mut self, sli: &LabelSlice, target: u8) -> SlicePrompt {
        let point = match self.config.point {
            None => None,
            // target 已确认存在于切片上, 可直接 unwrap.
            Some(PointKind::Center) => Some(sli.centroid(target).unwrap()),
            Some(PointKind::Random) => {
                let positions = sli.target_positions(target);
                Some(positions[self.rng.gen_range(0..positions.len())])
            }
        };
        let bbox = if self.config.bbox {
            Some(
                sli.bbox(target)
                    .unwrap()
                    .expanded(self.config.margin, sli.shape()),
            )
        } else {
            None
        };
        SlicePrompt { point, bbox }
    }
}
