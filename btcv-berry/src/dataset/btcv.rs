//! BTCV CT scan/label 数据加载器.
//!
//! 提供迭代器风格的数据集获取模式.

use super::descriptor::{DatasetDescriptor, SampleEntry, Split};
use crate::CtData3d;
use std::path::PathBuf;

/// 从描述文件的某一划分和数据目录创建 BTCV 样本 ([`CtData3d`]) 加载器.
///
/// # 注意
///
/// 1. `data_dir` 必须是目录, 否则程序 panic.
/// 2. 每个条目的 `image`/`label` 必须在 `data_dir` 下有对应的 nifti 文件,
///   否则加载器在迭代时会返回 `Result::Error`.
pub fn sample_loader<P: Into<PathBuf>>(
    desc: &DatasetDescriptor,
    split: Split,
    data_dir: P,
) -> SampleLoader {
    let data_dir = data_dir.into();
    assert!(data_dir.is_dir());

    let mut entries_rev: Vec<(usize, SampleEntry)> =
        desc.split(split).iter().cloned().enumerate().collect();
    entries_rev.reverse();

    SampleLoader {
        data_dir,
        entries_rev,
    }
}

/// 3D CT 数据集 (scan + label) 加载器, 并在内部自动拼接文件路径.
#[derive(Debug)]
pub struct SampleLoader {
    data_dir: PathBuf,
    entries_rev: Vec<(usize, SampleEntry)>,
}

impl Iterator for SampleLoader {
    type Item = (usize, nifti::Result<CtData3d>);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, entry) = self.entries_rev.pop()?;

        let scan_path = self.data_dir.join(&entry.image);
        let label_path = self.data_dir.join(&entry.label);
        let data = CtData3d::open(scan_path, label_path);

        Some((idx, data))
    }
}

impl ExactSizeIterator for SampleLoader {
    #[inline]
    fn len(&self) -> usize {
        self.entries_rev.len()
    }
}
