//! Command-line interface
//!
//! Every option is optional: a flag that is present overrides the value
//! coming from defaults, the config file or the environment.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for ensemble inference
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "mer-ensemble", version)]
#[command(about = "Ensembled batch inference for handwritten math expression recognition")]
pub struct Cli {
    /// Checkpoint paths, one per ensemble member
    #[arg(long, num_args = 1.., value_name = "PATH")]
    pub models: Option<Vec<String>>,

    /// Per-model input heights; a single value applies to every model
    #[arg(long, num_args = 1.., value_name = "H")]
    pub heights: Option<Vec<u32>>,

    /// Per-model input widths; a single value applies to every model
    #[arg(long = "width", visible_alias = "widths", num_args = 1.., value_name = "W")]
    pub widths: Option<Vec<u32>>,

    /// Length of the dummy target sequence
    #[arg(long = "max_sequence", visible_alias = "max-sequence")]
    pub max_sequence: Option<usize>,

    #[arg(long = "batch_size", visible_alias = "batch-size")]
    pub batch_size: Option<usize>,

    /// Logged for reproducibility; inference is deterministic
    #[arg(long)]
    pub seed: Option<u64>,

    /// Manifest path; `gt.txt` and `images/` are read from its directory
    #[arg(long = "file_path", visible_alias = "file-path")]
    pub file_path: Option<PathBuf>,

    #[arg(long = "output_dir", visible_alias = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fold assignment file (`image_name,fold,...`)
    #[arg(long = "data-info", visible_alias = "data_info", value_name = "FILE")]
    pub data_info: Option<PathBuf>,

    /// Fold evaluated
    #[arg(long)]
    pub fold: Option<i64>,

    /// Threads decoding images
    #[arg(long)]
    pub workers: Option<usize>,

    /// Intra-op threads per ONNX session
    #[arg(long = "onnx-threads", visible_alias = "onnx_threads")]
    pub onnx_threads: Option<usize>,

    /// Score predictions against manifest labels
    #[arg(long)]
    pub evaluate: bool,

    /// Log output format
    #[arg(long = "log-format", value_parser = ["pretty", "json"])]
    pub log_format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore_and_dash_spellings() {
        let cli = Cli::parse_from([
            "mer-ensemble",
            "--batch_size",
            "16",
            "--max-sequence",
            "50",
            "--file-path",
            "/data/gt.txt",
        ]);
        assert_eq!(cli.batch_size, Some(16));
        assert_eq!(cli.max_sequence, Some(50));
        assert_eq!(cli.file_path, Some(PathBuf::from("/data/gt.txt")));
    }

    #[test]
    fn test_multiple_models_and_sizes() {
        let cli = Cli::parse_from([
            "mer-ensemble",
            "--models",
            "ckpt/a",
            "ckpt/b",
            "--heights",
            "128",
            "256",
            "--widths",
            "512",
        ]);
        assert_eq!(
            cli.models,
            Some(vec!["ckpt/a".to_string(), "ckpt/b".to_string()])
        );
        assert_eq!(cli.heights, Some(vec![128, 256]));
        assert_eq!(cli.widths, Some(vec![512]));
    }

    #[test]
    fn test_absent_flags_do_not_override() {
        let cli = Cli::parse_from(["mer-ensemble"]);
        assert!(cli.models.is_none());
        assert!(cli.batch_size.is_none());
        assert!(!cli.evaluate);
    }
}
