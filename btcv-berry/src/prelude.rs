//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{
    BBox, CtData3d, CtLabel, CtScan, CtWindow, LabelSlice, NiftiHeaderAttr, ScanSlice,
};

pub use crate::consts::{all_targets, organ, NUM_CLASSES};

pub use crate::dataset::{self, DatasetDescriptor, SampleLoader, Split};

pub use crate::eval::dice::{dice_score, DiceReport};
pub use crate::eval::{assemble_range, empty_range, slice_ranges, SegmentVolume};

pub use crate::model::{SegmentError, SliceOutput, SliceSegmenter};
pub use crate::prompt::{PointKind, PromptBuilder, PromptConfig, SliceInput, UsedTargets};

#[cfg(feature = "onnx")]
pub use crate::model::OnnxSam;
