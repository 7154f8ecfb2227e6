use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::checkpoint::{write_atomic, Checkpoint};
use crate::error::Error;

pub const DEFAULT_PATIENCE: u64 = 5;
pub const DEFAULT_DUMP_FILE: &str = "model.safetensors";

/// Which validation metric drives improvement decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monitor {
    ValLoss,
    ValAcc,
}

impl Monitor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Monitor::ValLoss => "val_loss",
            Monitor::ValAcc => "val_acc",
        }
    }

    // Higher is better after normalization
    fn score(&self, metrics: &Metrics) -> f64 {
        match self {
            Monitor::ValLoss => -metrics.val_loss,
            Monitor::ValAcc => metrics.val_acc,
        }
    }
}

impl FromStr for Monitor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "val_loss" => Ok(Monitor::ValLoss),
            "val_acc" => Ok(Monitor::ValAcc),
            other => Err(Error::InvalidConfiguration(format!(
                "unsupported monitor '{}', expected 'val_loss' or 'val_acc'",
                other
            ))),
        }
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation metrics reported for one evaluation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub val_loss: f64,
    pub val_acc: f64,
}

impl Metrics {
    pub fn new(val_loss: f64, val_acc: f64) -> Self {
        Self { val_loss, val_acc }
    }

    pub fn loss(val_loss: f64) -> Self {
        Self {
            val_loss,
            ..Self::default()
        }
    }

    pub fn accuracy(val_acc: f64) -> Self {
        Self {
            val_acc,
            ..Self::default()
        }
    }
}

/// Outcome of a single [`EarlyStopping::observe`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Improved {
        monitor: Monitor,
        previous: f64,
        current: f64,
        path: PathBuf,
    },
    NoImprovement {
        monitor: Monitor,
        counter: u64,
        patience: u64,
        /// Sign-normalized best score, so a loss is reported negated.
        best: f64,
    },
}

impl Status {
    pub fn improved(&self) -> bool {
        matches!(self, Status::Improved { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Improved {
                monitor,
                previous,
                current,
                ..
            } => write!(
                f,
                "{}: {:.6} -> {:.6}, best model saved.",
                monitor, previous, current
            ),
            Status::NoImprovement {
                monitor,
                counter,
                patience,
                best,
            } => write!(
                f,
                "EarlyStopping counter: {}/{}. Current best {}: {:.6}",
                counter, patience, monitor, best
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EarlyStoppingConfig {
    pub patience: u64,
    pub delta: f64,
    pub monitor: Monitor,
    pub dump_file: PathBuf,
    pub verbose: bool,
    /// Clear the stop signal when a later cycle improves again.
    pub clear_stop_on_improvement: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: DEFAULT_PATIENCE,
            delta: 0.0,
            monitor: Monitor::ValAcc,
            dump_file: PathBuf::from(DEFAULT_DUMP_FILE),
            verbose: false,
            clear_stop_on_improvement: false,
        }
    }
}

/// Stops training once the monitored metric has not improved for `patience`
/// consecutive cycles, and keeps the best model on disk.
///
/// The stop signal is sticky: an improvement after it was raised resets the
/// counter but leaves [`EarlyStopping::should_stop`] true, unless
/// `clear_stop_on_improvement` is set.
#[derive(Debug)]
pub struct EarlyStopping {
    patience: u64,
    delta: f64,
    monitor: Monitor,
    dump_file: PathBuf,
    verbose: bool,
    clear_stop_on_improvement: bool,

    counter: u64,
    best_score: Option<f64>,
    early_stop: bool,
    val_loss_min: f64,
    val_acc_max: f64,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> Result<Self, Error> {
        if !config.delta.is_finite() || config.delta < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "delta must be a non-negative finite number, got {}",
                config.delta
            )));
        }

        Ok(Self {
            patience: config.patience,
            delta: config.delta,
            monitor: config.monitor,
            dump_file: config.dump_file,
            verbose: config.verbose,
            clear_stop_on_improvement: config.clear_stop_on_improvement,
            counter: 0,
            best_score: None,
            early_stop: false,
            val_loss_min: f64::INFINITY,
            val_acc_max: 0.0,
        })
    }

    /// Records one evaluation cycle, saving `model` if it improved.
    ///
    /// If the snapshot cannot be written the error is returned and no state changes.
    pub fn observe<C: Checkpoint + ?Sized>(
        &mut self,
        model: &C,
        metrics: Metrics,
    ) -> Result<Status, Error> {
        let score = self.monitor.score(&metrics);

        let status = if self.is_improvement(score) {
            write_atomic(model, &self.dump_file)?;
            self.commit_improvement(score, metrics)
        } else {
            self.record_plateau()
        };

        if self.verbose {
            log::info!("{}", status);
        } else {
            log::debug!("{}", status);
        }

        Ok(status)
    }

    // The first observation is always saved, whatever its value. A NaN best
    // is replaced by the next real score.
    fn is_improvement(&self, score: f64) -> bool {
        match self.best_score {
            None => true,
            Some(best) if best.is_nan() => !score.is_nan(),
            Some(best) => score >= best + self.delta,
        }
    }

    fn commit_improvement(&mut self, score: f64, metrics: Metrics) -> Status {
        let (previous, current) = match self.monitor {
            Monitor::ValLoss => (self.val_loss_min, metrics.val_loss),
            Monitor::ValAcc => (self.val_acc_max, metrics.val_acc),
        };

        self.best_score = Some(score);
        self.counter = 0;
        self.val_loss_min = metrics.val_loss;
        self.val_acc_max = metrics.val_acc;
        if self.clear_stop_on_improvement {
            self.early_stop = false;
        }

        Status::Improved {
            monitor: self.monitor,
            previous,
            current,
            path: self.dump_file.clone(),
        }
    }

    fn record_plateau(&mut self) -> Status {
        self.counter += 1;
        if self.counter >= self.patience {
            self.early_stop = true;
        }

        Status::NoImprovement {
            monitor: self.monitor,
            counter: self.counter,
            patience: self.patience,
            // Set by the first observation, which always counts as an improvement
            best: self.best_score.unwrap_or(f64::NEG_INFINITY),
        }
    }

    pub fn should_stop(&self) -> bool {
        self.early_stop
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn patience(&self) -> u64 {
        self.patience
    }

    /// Best score so far, normalized so that higher is better.
    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor
    }

    pub fn dump_file(&self) -> &Path {
        &self.dump_file
    }

    pub fn last_val_loss(&self) -> f64 {
        self.val_loss_min
    }

    pub fn last_val_acc(&self) -> f64 {
        self.val_acc_max
    }
}
