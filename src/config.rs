//! Configuration management for ensemble inference
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! `MER__SECTION__KEY` environment variables, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::dataset::fold::default_fold_path;
use crate::dataset::InputSize;
use crate::writer::DEFAULT_OUTPUT_FILE;

/// Default checkpoint evaluated when no models are given.
pub const DEFAULT_MODEL: &str = "./log/my_satrn/checkpoints/0.7907 F0 dual opt MySATRN_best_model";

/// Evaluation data channel, read from `SM_CHANNEL_EVAL`.
pub const DEFAULT_EVAL_CHANNEL: &str = "/opt/ml/input/data/";

/// Output directory, read from `SM_OUTPUT_DATA_DIR`.
pub const DEFAULT_OUTPUT_DIR: &str = "submit";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub models: ModelsConfig,
    pub data: DataConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub run: RunConfig,
}

/// Ensemble members configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// Checkpoint paths, one per member
    pub paths: Vec<String>,
    /// Per-model input heights; empty uses each checkpoint's own size
    #[serde(default)]
    pub heights: Vec<u32>,
    /// Per-model input widths; empty uses each checkpoint's own size
    #[serde(default)]
    pub widths: Vec<u32>,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Evaluation data configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Manifest path; only its directory is used
    pub file_path: PathBuf,
    /// Fold assignment CSV
    pub data_info: PathBuf,
    /// Fold selected for evaluation
    pub fold: i64,
    /// Length of the dummy target sequence
    pub max_sequence: usize,
    pub batch_size: usize,
    /// Threads decoding images
    pub workers: usize,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub file_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

/// Run options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    pub seed: u64,
    /// Score predictions against manifest labels
    pub evaluate: bool,
    /// Batches between progress logs; zero disables them
    pub progress_every: usize,
}

impl AppConfig {
    /// Defaults, taking the data and output locations from a variable lookup.
    pub fn defaults_from(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let eval_dir =
            lookup("SM_CHANNEL_EVAL").unwrap_or_else(|| DEFAULT_EVAL_CHANNEL.to_string());
        let output_dir =
            lookup("SM_OUTPUT_DATA_DIR").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Self {
            models: ModelsConfig {
                paths: vec![DEFAULT_MODEL.to_string()],
                heights: Vec::new(),
                widths: Vec::new(),
                onnx_threads: default_onnx_threads(),
            },
            data: DataConfig {
                file_path: Path::new(&eval_dir).join("train_dataset").join("gt.txt"),
                data_info: default_fold_path(),
                fold: 0,
                max_sequence: 230,
                batch_size: 128,
                workers: 8,
            },
            output: OutputConfig {
                dir: PathBuf::from(output_dir),
                file_name: DEFAULT_OUTPUT_FILE.to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            run: RunConfig {
                seed: 21,
                evaluate: false,
                progress_every: 10,
            },
        }
    }

    /// Load configuration from every layer, reading the process environment.
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_with(cli, |key| std::env::var(key).ok(), environment())
    }

    /// Load configuration with an explicit variable lookup and environment source.
    pub fn load_with(
        cli: &Cli,
        lookup: impl Fn(&str) -> Option<String>,
        env: Environment,
    ) -> Result<Self> {
        let defaults = Config::try_from(&Self::defaults_from(lookup))
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(path.as_path()));
        }
        builder = builder.add_source(env);

        let to_i64 = |v: usize| v as i64;
        let sizes = |v: &Vec<u32>| v.iter().map(|&x| i64::from(x)).collect::<Vec<_>>();
        let path = |p: &PathBuf| p.to_string_lossy().into_owned();
        builder = builder
            .set_override_option("models.paths", cli.models.clone())?
            .set_override_option("models.heights", cli.heights.as_ref().map(sizes))?
            .set_override_option("models.widths", cli.widths.as_ref().map(sizes))?
            .set_override_option("models.onnx_threads", cli.onnx_threads.map(to_i64))?
            .set_override_option("data.max_sequence", cli.max_sequence.map(to_i64))?
            .set_override_option("data.batch_size", cli.batch_size.map(to_i64))?
            .set_override_option("data.file_path", cli.file_path.as_ref().map(path))?
            .set_override_option("data.data_info", cli.data_info.as_ref().map(path))?
            .set_override_option("data.fold", cli.fold)?
            .set_override_option("data.workers", cli.workers.map(to_i64))?
            .set_override_option("output.dir", cli.output_dir.as_ref().map(path))?
            .set_override_option("logging.format", cli.log_format.clone())?
            .set_override_option("run.seed", cli.seed.map(|s| s as i64))?
            .set_override_option("run.evaluate", cli.evaluate.then_some(true))?;

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run can succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.models.paths.is_empty() {
            bail!("at least one model checkpoint is required");
        }
        if self.data.batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        let members = self.models.paths.len();
        for (name, values) in [("heights", &self.models.heights), ("widths", &self.models.widths)] {
            if values.len() > 1 && values.len() != members {
                bail!(
                    "{name} lists {} values for {members} models; give one value or one per model",
                    values.len()
                );
            }
            if values.contains(&0) {
                bail!("{name} must be positive");
            }
        }
        Ok(())
    }

    /// Input size for every member.
    ///
    /// Explicit heights and widths win; a single value applies to all
    /// members. Otherwise each checkpoint's recorded size is used, then
    /// [`InputSize::DEFAULT`].
    pub fn resolve_input_sizes(&self, recorded: &[Option<InputSize>]) -> Result<Vec<InputSize>> {
        let pick = |values: &[u32], index: usize| match values {
            [] => None,
            [single] => Some(*single),
            many => many.get(index).copied(),
        };

        recorded
            .iter()
            .enumerate()
            .map(|(index, own)| {
                let fallback = own.unwrap_or(InputSize::DEFAULT);
                let height = pick(self.models.heights.as_slice(), index).unwrap_or(fallback.height);
                let width = pick(self.models.widths.as_slice(), index).unwrap_or(fallback.width);
                if height == 0 || width == 0 {
                    bail!("model {index} resolves to an empty input size {height}x{width}");
                }
                Ok(InputSize::new(height, width))
            })
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::defaults_from(|key| std::env::var(key).ok())
    }
}

/// `MER__SECTION__KEY` environment source.
pub fn environment() -> Environment {
    Environment::with_prefix("MER")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("models.paths")
        .with_list_parse_key("models.heights")
        .with_list_parse_key("models.widths")
}
