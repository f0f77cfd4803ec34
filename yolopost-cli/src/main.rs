use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use yolopost::{
    parse_anchors, Anchor, Config, Detection, NumericMode, Pipeline, PredictionBatch,
    SuppressionStrategy,
};

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode and suppress YOLO grid output (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Raw little-endian f32 tensor holding one image or a whole batch.
    #[arg(long, value_name = "FILE")]
    tensor: Option<PathBuf>,
    /// Detection threshold, overrides the config file.
    #[arg(short, long)]
    threshold: Option<f32>,
    /// Write the detections here instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StrategyConfig {
    Global,
    PerClass,
}

impl From<StrategyConfig> for SuppressionStrategy {
    fn from(value: StrategyConfig) -> Self {
        match value {
            StrategyConfig::Global => SuppressionStrategy::Global,
            StrategyConfig::PerClass => SuppressionStrategy::PerClass,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NumericModeConfig {
    Strict,
    Lenient,
}

impl From<NumericModeConfig> for NumericMode {
    fn from(value: NumericModeConfig) -> Self {
        match value {
            NumericModeConfig::Strict => NumericMode::Strict,
            NumericModeConfig::Lenient => NumericMode::Lenient,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelConfig {
    grid_size: usize,
    nms_threshold: f32,
    /// Maximum detections kept per image.
    true_box_buffer: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
}

fn default_batch_size() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct PathConfig {
    labels: PathBuf,
    anchors: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    model: ModelConfig,
    config_path: PathConfig,
    /// Inline `[w, h]` anchors, used when no anchors file is given.
    #[serde(default)]
    anchors: Option<Vec<[f32; 2]>>,
    #[serde(default = "default_detection_threshold")]
    detection_threshold: f32,
    #[serde(default = "default_strategy")]
    strategy: StrategyConfig,
    #[serde(default = "default_numeric_mode")]
    numeric_mode: NumericModeConfig,
    #[serde(default)]
    parallel: bool,
}

fn default_detection_threshold() -> f32 {
    0.3
}

fn default_strategy() -> StrategyConfig {
    StrategyConfig::PerClass
}

fn default_numeric_mode() -> NumericModeConfig {
    NumericModeConfig::Strict
}

#[derive(Debug, Serialize)]
struct DetectionRecord {
    label: String,
    class: usize,
    score: f32,
    #[serde(rename = "box")]
    bbox: [f32; 4],
}

#[derive(Debug, Serialize)]
struct ImageRecord {
    index: usize,
    detections: Vec<DetectionRecord>,
}

#[derive(Debug, Serialize)]
struct Output {
    images: Vec<ImageRecord>,
}

/// One label per non-empty line, trailing whitespace removed.
fn load_labels(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    let labels: Vec<String> = text
        .lines()
        .map(|line| line.trim_end().to_owned())
        .filter(|line| !line.is_empty())
        .collect();
    if labels.is_empty() {
        return Err(format!("label file {} is empty", path.display()).into());
    }
    Ok(labels)
}

fn load_tensor(path: &Path) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(format!(
            "tensor file {} has {} bytes, not a multiple of 4",
            path.display(),
            bytes.len()
        )
        .into());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn to_record(detection: &Detection, labels: &[String]) -> DetectionRecord {
    DetectionRecord {
        label: labels
            .get(detection.class)
            .cloned()
            .unwrap_or_else(|| detection.class.to_string()),
        class: detection.class,
        score: detection.score,
        bbox: detection.bbox.to_array(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("yolopost=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let tensor_path = cli.tensor.ok_or("--tensor is required")?;
    let config_text = fs::read_to_string(&cli.config)?;
    let file_cfg: FileConfig = serde_json::from_str(&config_text)?;
    let base = cli.config.parent().unwrap_or_else(|| Path::new("."));

    let labels = load_labels(&resolve(base, &file_cfg.config_path.labels))?;
    let anchors: Vec<Anchor> = match (&file_cfg.config_path.anchors, &file_cfg.anchors) {
        (Some(path), _) => parse_anchors(&fs::read_to_string(resolve(base, path))?)?,
        (None, Some(inline)) => inline.iter().map(|[w, h]| Anchor::new(*w, *h)).collect(),
        (None, None) => return Err("either config_path.anchors or anchors must be set".into()),
    };

    let cfg = Config::builder()
        .grid_size(file_cfg.model.grid_size)
        .anchors(anchors)
        .num_classes(labels.len())
        .detection_threshold(cli.threshold.unwrap_or(file_cfg.detection_threshold))
        .nms_iou_threshold(file_cfg.model.nms_threshold)
        .max_detections(file_cfg.model.true_box_buffer)
        .batch_size(file_cfg.model.batch_size)
        .numeric_mode(file_cfg.numeric_mode.into())
        .parallel(file_cfg.parallel)
        .build()?;
    tracing::info!(
        grid_size = cfg.grid_size(),
        anchors = cfg.num_anchors(),
        classes = cfg.num_classes(),
        "loaded config"
    );

    let data = load_tensor(&tensor_path)?;
    let batch =
        PredictionBatch::from_slice(&data, cfg.grid_size(), cfg.num_anchors(), cfg.channels())?;
    let pipeline = Pipeline::new(cfg).with_strategy(file_cfg.strategy.into());
    let results = pipeline.run_batch(batch)?;

    let images = results
        .iter()
        .enumerate()
        .map(|(index, detections)| ImageRecord {
            index,
            detections: detections.iter().map(|d| to_record(d, &labels)).collect(),
        })
        .collect();
    let json = serde_json::to_string_pretty(&Output { images })?;

    match cli.output {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
