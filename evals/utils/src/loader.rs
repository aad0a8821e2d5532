//! 对 `btcv_berry::dataset` 的更一层封装. 提供更直接的数据集路径解析.

use std::env;
use std::path::{Path, PathBuf};

/// 获取 BTCV 原始数据基本路径.
///
/// 1. 若环境变量 `$BTCV_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/RawData`.
pub fn data_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("BTCV_DATA_DIR") {
        PathBuf::from(d)
    } else {
        btcv_berry::dataset::home_dataset_dir_with(["RawData"]).unwrap()
    }
}

/// 获取数据集描述文件路径.
///
/// 1. 若环境变量 `$BTCV_DESCRIPTOR` 非空, 则返回其值;
/// 2. 否则, 返回 `{data_dir}/dataset_0.json`.
pub fn descriptor_path_in<P: AsRef<Path>>(data_dir: P) -> PathBuf {
    if let Ok(d) = env::var("BTCV_DESCRIPTOR") {
        PathBuf::from(d)
    } else {
        data_dir.as_ref().join("dataset_0.json")
    }
}
