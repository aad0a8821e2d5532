//! BTCV 13 器官 mDice 评估驱动.
//!
//! 将验证集中每个 3D 样本切成 2D slice ranges, 用可提示分割模型
//! 逐切片分割出现的器官, 重组 3D 掩码并打印逐样本 Dice 报告.

mod report;
mod runner;

use btcv_berry::dataset::{sample_loader, DatasetDescriptor, Split};
use btcv_berry::model::OnnxSam;
use btcv_berry::prompt::{PointKind, PromptBuilder, PromptConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

/// 配置错误的退出码.
const EXIT_CONFIG: u8 = 2;

/// 所有样本均失败的退出码.
const EXIT_ALL_FAILED: u8 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "mdice13",
    about = "Evaluate a promptable segmentation model on BTCV 13-organ CT volumes"
)]
struct Args {
    /// Organ target to segment (1..=13); 0 segments all targets.
    #[arg(long, default_value_t = 0)]
    target: u8,

    /// Directory of the raw data; defaults to $BTCV_DATA_DIR or ~/dataset/RawData.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path of the json file that describes the dataset;
    /// defaults to $BTCV_DESCRIPTOR or {data-dir}/dataset_0.json.
    #[arg(long)]
    descriptor: Option<PathBuf>,

    /// Point prompt kind.
    #[arg(long, value_enum, default_value_t = PointArg::Center)]
    point_prompt: PointArg,

    /// Also prompt with the target's bounding box.
    #[arg(long, default_value_t = false)]
    bounding_box_prompt: bool,

    /// Margin of the bounding box, in pixels.
    #[arg(long, default_value_t = 0)]
    box_margin: usize,

    /// How many 2D slices to prompt per inference batch.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Random seed for prompt sampling.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// SAM image encoder checkpoint (onnx).
    #[arg(long)]
    encoder: PathBuf,

    /// SAM prompt decoder checkpoint (onnx).
    #[arg(long)]
    decoder: PathBuf,

    /// Intra-op thread count of the onnxruntime sessions.
    #[arg(long, default_value_t = 4)]
    intra_threads: usize,

    /// Directory to write per-range overlay images into (disabled when absent).
    #[arg(long)]
    visualize: Option<PathBuf>,

    /// Upper bound of overlay images written per run.
    #[arg(long, default_value_t = 16)]
    visualize_limit: usize,

    /// Stop after the first sample (debugging aid).
    #[arg(long, default_value_t = false)]
    first_sample_only: bool,
}

/// 点提示方式的命令行形式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PointArg {
    /// 质心点提示.
    Center,
    /// 随机点提示.
    Random,
    /// 不使用点提示.
    None,
}

impl PointArg {
    fn to_kind(self) -> Option<PointKind> {
        match self {
            PointArg::Center => Some(PointKind::Center),
            PointArg::Random => Some(PointKind::Random),
            PointArg::None => None,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    if args.batch_size == 0 {
        eprintln!("batch size must be positive");
        return ExitCode::from(EXIT_CONFIG);
    }

    let config = PromptConfig {
        point: args.point_prompt.to_kind(),
        bbox: args.bounding_box_prompt,
        margin: args.box_margin,
        target: (args.target != 0).then_some(args.target),
    };
    let mut builder = match PromptBuilder::new(config.clone(), args.seed) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("invalid prompt configuration: {e:?}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    println!("{config}");

    let data_dir = args
        .data_dir
        .unwrap_or_else(utils::loader::data_dir_from_env_or_home);
    if !data_dir.is_dir() {
        eprintln!("data directory {} does not exist", data_dir.display());
        return ExitCode::from(EXIT_CONFIG);
    }
    let descriptor_path = args
        .descriptor
        .unwrap_or_else(|| utils::loader::descriptor_path_in(&data_dir));
    let descriptor = match DatasetDescriptor::open(&descriptor_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!(
                "cannot read dataset descriptor {}: {e:?}",
                descriptor_path.display()
            );
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let mut model = match OnnxSam::load(&args.encoder, &args.decoder, args.intra_threads) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("cannot load model checkpoint: {e:?}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Some(dir) = &args.visualize {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("cannot create overlay directory {}: {e}", dir.display());
            return ExitCode::from(EXIT_CONFIG);
        }
    }

    let opts = runner::RunOptions {
        batch_size: args.batch_size,
        visualize: args.visualize,
        visualize_limit: args.visualize_limit,
        first_sample_only: args.first_sample_only,
    };

    eprintln!("Segmenting on validation dataset...");
    let loader = sample_loader(&descriptor, Split::Validation, data_dir);
    let summary = runner::run(&mut model, &mut builder, loader, &opts);

    utils::sep();
    println!(
        "Evaluated {} samples, {} failed",
        summary.evaluated, summary.failed
    );
    if summary.evaluated == 0 && summary.failed > 0 {
        return ExitCode::from(EXIT_ALL_FAILED);
    }
    ExitCode::SUCCESS
}
