#![warn(missing_docs)]
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供 BTCV 格式的 3D 腹部多器官 CT 扫描/标注文件的结构化信息,
//! 以及用可提示分割模型 (如 SAM) 逐切片评估 13 个器官类别所需的全部原语.
//!
//! 该 crate 目前仅提供 `safe` 接口. 将来可能为部分高性能场景关键路径提供 `unsafe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 目前主要负责处理 BTCV 数据, 没有对其它源的数据进行直接适配
//!   (但如果新数据按照 BTCV 模式进行组织, 也可以工作).
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 开发计划
//!
//! ### 3D 数据结构与切片视图 ✅
//!
//! nii 文件加载, (H, W, Z) 布局, 水平切片视图与 target 几何信息提取.
//!
//! 实现位于 `btcv-berry/src/data`.
//!
//! ### 数据集描述文件与样本加载器 ✅
//!
//! `dataset_0.json` 描述文件解析, 以及迭代器风格的 (扫描, 标注) 样本加载.
//!
//! 实现位于 `btcv-berry/src/dataset`.
//!
//! ### 提示构造 ✅
//!
//! 中心点/随机点提示与包围盒提示, 随机性由显式传入的种子控制.
//!
//! 实现位于 `btcv-berry/src/prompt.rs`.
//!
//! ### 模型边界与 ONNX 后端 ✅
//!
//! `SliceSegmenter` trait 描述逐切片批推理约定; `onnx` feature
//! 提供基于 ONNX Runtime 的 SAM encoder/decoder 后端.
//!
//! 实现位于 `btcv-berry/src/model`.
//!
//! ### 评估流水线原语 ✅
//!
//! 1. 如何把 \[0, Z) 切成定长 slice ranges? ✅
//! 2. 如何把逐切片掩码散射回 (14, H, W, Z) 的 4D 结果? ✅
//! 3. 空 batch 时如何零填充? ✅
//! 4. 如何对缺失 target 做 "不可计分" 处理并求 mDice? ✅
//!
//! 上述问题的答案:
//!
//! 1. 断点序列 `0, B, 2B, ...` 以 Z 收束, 相邻断点对即 range.
//! 2. 按 `used_targets` 与输出的位置对应关系写入
//!   `result[target, .., .., z - range_start]`, 各 range 块最后按 Z 拼接.
//! 3. 直接产出全零 (14, H, W, range_len) 块, 不触碰模型.
//! 4. 以 `Option<f64>` 显式表达缺失, 而不是 NaN 哨兵值;
//!   全部缺失时均值同样为 `None`.
//!
//! 实现位于 `btcv-berry/src/eval`.
//!
//! ### 叠加可视化 ✅
//!
//! 窗口化灰度底图 + 每类别一色的掩码叠加.
//!
//! 实现位于 `btcv-berry/src/vis.rs`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private API 提供文档.

/// 二维索引 (高, 宽), 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引 (高, 宽, 切片), 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D CT nii 文件基础数据结构.
mod data;

pub use data::{
    BBox, CtData3d, CtLabel, CtScan, CtWindow, LabelSlice, NiftiHeaderAttr, ScanSlice,
};

pub mod consts;

pub mod dataset;
pub mod eval;
pub mod model;
pub mod prelude;
pub mod prompt;
pub mod vis;
