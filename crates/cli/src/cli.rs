//! Command-Line Definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fault-diag")]
#[command(author, version, about = "Analog circuit fault diagnosis from waveform statistics")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Engineer raw statistics into the retained feature table
    Prepare {
        /// Raw statistics file
        #[arg(short, long)]
        input: PathBuf,

        /// Engineered checkpoint to write
        #[arg(short, long)]
        output: PathBuf,

        /// Also write a capped and oversampled copy for inspection
        #[arg(long)]
        balanced_output: Option<PathBuf>,
    },

    /// Report highly correlated raw statistics
    Correlate {
        /// Raw statistics file
        #[arg(short, long)]
        input: PathBuf,

        /// Absolute correlation threshold (default from config)
        #[arg(short, long)]
        threshold: Option<f64>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// One-way ANOVA of each engineered feature against the label
    Anova {
        /// Engineered checkpoint (or raw file with --raw)
        #[arg(short, long)]
        input: PathBuf,

        /// Input holds raw statistics to engineer first
        #[arg(long)]
        raw: bool,

        /// Significance level (default from config)
        #[arg(short, long)]
        alpha: Option<f64>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Train on a stratified split and evaluate on the held-out test set
    Train {
        /// Engineered checkpoint (or raw file with --raw)
        #[arg(short, long)]
        input: PathBuf,

        /// Input holds raw statistics to engineer first
        #[arg(long)]
        raw: bool,

        /// Model artifact to write (`.json` for text, anything else binary)
        #[arg(short, long)]
        model: PathBuf,

        /// Write the training history and holdout report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Stratified k-fold cross-validation
    CrossValidate {
        /// Engineered checkpoint (or raw file with --raw)
        #[arg(short, long)]
        input: PathBuf,

        /// Input holds raw statistics to engineer first
        #[arg(long)]
        raw: bool,

        /// Number of folds (default from config)
        #[arg(short = 'k', long)]
        folds: Option<usize>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Predict the fault class of new raw statistics
    Predict {
        /// Model artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Raw statistics file, one prediction per row
        #[arg(short, long, conflicts_with = "value")]
        input: Option<PathBuf>,

        /// Single sample as `name=value` pairs
        #[arg(short, long, value_parser = parse_pair, num_args = 1..)]
        value: Vec<(String, f64)>,

        /// Do not clamp into the training bounds
        #[arg(long)]
        no_capping: bool,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the default configuration as TOML
    GenConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Parse `name=value`
fn parse_pair(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {}", s))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for {}: {}", name, e))?;
    Ok((name.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("rms=1.5"), Ok(("rms".to_string(), 1.5)));
        assert_eq!(parse_pair(" mean = -0.2 "), Ok(("mean".to_string(), -0.2)));
        assert!(parse_pair("rms").is_err());
        assert!(parse_pair("rms=abc").is_err());
    }

    #[test]
    fn test_predict_accepts_pairs() {
        let cli = Cli::try_parse_from([
            "fault-diag",
            "predict",
            "--model",
            "m.bin",
            "--value",
            "mean=0.1",
            "std=1.0",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict { value, .. } => assert_eq!(value.len(), 2),
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
