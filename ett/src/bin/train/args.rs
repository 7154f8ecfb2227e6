use clap::Parser;
use ett::device::DEFAULT_MIN_MEMORY_MB;
use ett::early_stopping::{EarlyStoppingConfig, DEFAULT_PATIENCE};
use ett::{Error, Monitor};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "ETT Trainer")]
#[command(author = "ETT Developers")]
#[command(version = "0.2.0")]
pub struct Args {
    /// Number of samples per training batch.
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Learning rate for the optimizer.
    #[arg(long, default_value_t = 0.01)]
    pub learning_rate: f64,

    /// Maximum number of training epochs.
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Number of synthetic samples to generate.
    #[arg(long, default_value_t = 4096)]
    pub samples: usize,

    /// Fraction of samples held out for validation.
    #[arg(long, default_value_t = 0.2)]
    pub val_ratio: f64,

    /// Epochs without improvement before early stopping.
    #[arg(long, default_value_t = DEFAULT_PATIENCE)]
    pub patience: u64,

    /// Minimum change in the monitored metric that counts as improvement.
    #[arg(long, default_value_t = 0.0)]
    pub delta: f64,

    /// Metric to monitor: val_loss or val_acc.
    #[arg(long, default_value = "val_acc")]
    pub monitor: String,

    /// Where the best model is saved. Defaults to a timestamped run directory.
    #[arg(long)]
    pub dump_file: Option<PathBuf>,

    /// Random seed, 0 leaves generators unseeded.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Preferred CUDA device ordinal.
    #[arg(long)]
    pub device: Option<usize>,

    /// Minimum free GPU memory (MB) required to train on a GPU.
    #[arg(long, default_value_t = DEFAULT_MIN_MEMORY_MB)]
    pub min_memory: u64,

    /// Log every early stopping decision.
    #[arg(short, long)]
    pub verbose: bool,

    /// Resume training when the metric improves after patience ran out.
    #[arg(long)]
    pub clear_stop_on_improvement: bool,
}

impl Args {
    pub fn early_stopping(&self, dump_file: PathBuf) -> Result<EarlyStoppingConfig, Error> {
        Ok(EarlyStoppingConfig {
            patience: self.patience,
            delta: self.delta,
            monitor: self.monitor.parse::<Monitor>()?,
            dump_file,
            verbose: self.verbose,
            clear_stop_on_improvement: self.clear_stop_on_improvement,
        })
    }
}
