//! BTCV 数据集描述文件 (如 `dataset_0.json`) 的结构化表示.

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// 读取描述文件错误.
#[derive(Debug)]
pub enum DescriptorError {
    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// JSON 结构不符合预期.
    Json(serde_json::Error),
}

/// 单个样本条目: 扫描文件与标注文件相对数据目录的路径.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleEntry {
    /// 3D 扫描 nii 文件相对路径.
    pub image: PathBuf,

    /// 3D 标注 nii 文件相对路径.
    pub label: PathBuf,
}

/// 数据集划分.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Split {
    /// 训练集.
    Training,

    /// 验证集.
    Validation,
}

impl Split {
    /// 描述文件中对应的键名.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Split::Training => "training",
            Split::Validation => "validation",
        }
    }
}

/// 数据集描述文件内容. 未知键会被忽略, 缺失的划分视为空.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetDescriptor {
    /// 训练集条目.
    #[serde(default)]
    pub training: Vec<SampleEntry>,

    /// 验证集条目.
    #[serde(default)]
    pub validation: Vec<SampleEntry>,
}

impl DatasetDescriptor {
    /// 从本地 json 文件读取描述.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DescriptorError> {
        let file = File::open(path.as_ref()).map_err(DescriptorError::Io)?;
        serde_json::from_reader(BufReader::new(file)).map_err(DescriptorError::Json)
    }

    /// 从 json 字符串解析描述.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        serde_json::from_str(text).map_err(DescriptorError::Json)
    }

    /// 获取某一划分的全部条目.
    #[inline]
    pub fn split(&self, split: Split) -> &[SampleEntry] {
        match split {
            Split::Training => &self.training,
            Split::Validation => &self.validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const DEMO: &str = r#"{
        "description": "btcv yucheng",
        "numTraining": 2,
        "training": [
            {"image": "imagesTr/img0001.nii.gz", "label": "labelsTr/label0001.nii.gz"},
            {"image": "imagesTr/img0002.nii.gz", "label": "labelsTr/label0002.nii.gz"}
        ],
        "validation": [
            {"image": "imagesTr/img0035.nii.gz", "label": "labelsTr/label0035.nii.gz"}
        ]
    }"#;

    #[test]
    fn test_parse_descriptor() {
        let desc = DatasetDescriptor::parse(DEMO).unwrap();
        assert_eq!(desc.split(Split::Training).len(), 2);
        assert_eq!(desc.split(Split::Validation).len(), 1);
        assert_eq!(
            desc.validation[0].image,
            Path::new("imagesTr/img0035.nii.gz")
        );
        assert_eq!(
            desc.validation[0].label,
            Path::new("labelsTr/label0035.nii.gz")
        );
    }

    #[test]
    fn test_missing_split_is_empty() {
        let desc = DatasetDescriptor::parse(r#"{"training": []}"#).unwrap();
        assert!(desc.split(Split::Training).is_empty());
        assert!(desc.split(Split::Validation).is_empty());
    }

    #[test]
    fn test_malformed_descriptor() {
        assert!(matches!(
            DatasetDescriptor::parse("not json"),
            Err(DescriptorError::Json(_))
        ));
        assert!(matches!(
            DatasetDescriptor::parse(r#"{"training": [{"image": 3}]}"#),
            Err(DescriptorError::Json(_))
        ));
    }

    #[test]
    fn test_split_keys() {
        assert_eq!(Split::Training.as_str(), "training");
        assert_eq!(Split::Validation.as_str(), "validation");
    }
}
