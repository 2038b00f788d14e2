//! neural_net_rust CLI
//!
//! Trains on one CSV file, streams progress to stdout and writes the loss
//! plot. Exit status: 0 success, 1 failure, 2 usage error.

use anyhow::{Context, Result};
use clap::Parser;
use neural_net_rust::config::EngineConfig;
use neural_net_rust::dataset::{LabelColumn, MalformedRowPolicy, TaskKind};
use neural_net_rust::model::Activation;
use neural_net_rust::pipeline::{self, RunOutcome};
use neural_net_rust::progress::ProgressWriter;
use neural_net_rust::CancellationToken;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "neural_net_rust")]
#[command(author = "neural-net-rust Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train a small feed-forward network on a CSV file", long_about = None)]
struct Args {
    /// Input CSV (header line, comma separated, label in the last column by default)
    csv: PathBuf,

    /// TOML configuration file (overrides NEURAL_NET_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Gradient-descent step size
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Seed for weight initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Hidden layer width, 0 for a linear model
    #[arg(long)]
    hidden_width: Option<usize>,

    /// Hidden activation: tanh, sigmoid or relu
    #[arg(long)]
    activation: Option<Activation>,

    /// Label column name (default: last column)
    #[arg(long)]
    label: Option<String>,

    /// auto, regression or classification
    #[arg(long)]
    task: Option<TaskKind>,

    /// Fail on the first malformed row instead of dropping it
    #[arg(long)]
    strict: bool,

    /// Train on raw feature values
    #[arg(long)]
    no_standardize: bool,

    /// Loss plot output path (default: output.png)
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Print a progress line every N epochs, 0 to disable
    #[arg(long)]
    progress_every: Option<usize>,

    /// Write the training report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Write the trained model as JSON (plus a BLAKE3 .hash file)
    #[arg(long)]
    model_out: Option<PathBuf>,

    /// Exit 0 even if training diverged
    #[arg(long)]
    allow_divergence: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let init = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(err) = init {
        eprintln!("Failed to set tracing subscriber: {}", err);
    }

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    info!("neural_net_rust v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args)?;
    apply_args(&mut config, args);
    debug!("Configuration: {:?}", config);

    let stdout = std::io::stdout();
    let mut progress = ProgressWriter::new(stdout.lock(), config.output.progress_every);
    let outcome = pipeline::run(&args.csv, &config, &CancellationToken::new(), &mut progress)
        .with_context(|| format!("Training on {} failed", args.csv.display()))?;
    drop(progress);

    {
        let mut out = stdout.lock();
        writeln!(out, "{}", outcome.summary)?;
        out.flush()?;
    }

    write_outputs(&outcome, args)?;

    if outcome.diverged() && !args.allow_divergence {
        eprintln!("Error: training diverged, loss is no longer finite");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    match &args.config {
        Some(path) => {
            let mut config = EngineConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => EngineConfig::from_env().context("Failed to load configuration"),
    }
}

fn apply_args(config: &mut EngineConfig, args: &Args) {
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(lr) = args.learning_rate {
        config.training.learning_rate = lr;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    if let Some(width) = args.hidden_width {
        config.training.hidden_width = width;
    }
    if let Some(activation) = args.activation {
        config.training.activation = activation;
    }
    if let Some(label) = &args.label {
        config.split.label = LabelColumn::Name(label.clone());
    }
    if let Some(task) = args.task {
        config.split.task = task;
    }
    if args.strict {
        config.split.policy = MalformedRowPolicy::Reject;
    }
    if args.no_standardize {
        config.split.standardize = false;
    }
    if let Some(plot) = &args.plot {
        config.output.plot_path = plot.clone();
    }
    if let Some(every) = args.progress_every {
        config.output.progress_every = every;
    }
}

fn write_outputs(outcome: &RunOutcome, args: &Args) -> Result<()> {
    if let Some(path) = &args.report_json {
        let json = serde_json::to_string_pretty(&outcome.report)
            .context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Report saved to {}", path.display());
    }

    if let Some(path) = &args.model_out {
        let Some(model) = &outcome.model else {
            eprintln!("Warning: no model written, training diverged");
            return Ok(());
        };
        let json = model.to_json().context("Failed to serialize model")?;
        std::fs::write(path, &json)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let hash_hex = hex::encode(blake3::hash(json.as_bytes()).as_bytes());
        let hash_file = hash_path(path);
        std::fs::write(&hash_file, &hash_hex)
            .with_context(|| format!("Failed to write {}", hash_file.display()))?;
        info!("Model saved to {} ({})", path.display(), hash_hex);
    }
    Ok(())
}

fn hash_path(model_path: &Path) -> PathBuf {
    let mut name = model_path.as_os_str().to_os_string();
    name.push(".hash");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "neural_net_rust",
            "data.csv",
            "--epochs",
            "7",
            "--activation",
            "relu",
            "--task",
            "regression",
            "--strict",
            "--plot",
            "curve.png",
        ]);
        let mut config = EngineConfig::default();
        apply_args(&mut config, &args);

        assert_eq!(config.training.epochs, 7);
        assert_eq!(config.training.activation, Activation::Relu);
        assert_eq!(config.split.task, TaskKind::Regression);
        assert_eq!(config.split.policy, MalformedRowPolicy::Reject);
        assert_eq!(config.output.plot_path, PathBuf::from("curve.png"));
        assert!(config.split.standardize);
    }

    #[test]
    fn test_hash_path() {
        assert_eq!(hash_path(Path::new("out/model.json")), PathBuf::from("out/model.json.hash"));
    }
}
