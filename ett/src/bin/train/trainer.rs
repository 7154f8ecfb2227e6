use candle_core::Device;
use candle_nn::{AdamW, Module, Optimizer, ParamsAdamW, VarMap};
use ett::checkpoint;
use ett::{EarlyStopping, Metrics};
use rand::rngs::StdRng;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::args::Args;
use crate::data::Dataset;
use crate::model::{correct, create_classifier, cross_entropy, Classifier};
use crate::progress::TrainingProgressBar;

pub struct Trainer {
    network: Classifier,
    optimizer: AdamW,
    varmap: VarMap,
    device: Device,
    batch_size: usize,
    epochs: usize,
}

impl Trainer {
    pub fn new(args: &Args, device: Device) -> Result<Self, Box<dyn Error>> {
        let (network, varmap) = create_classifier(&device)?;
        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: args.learning_rate,
                ..Default::default()
            },
        )?;

        Ok(Self {
            network,
            optimizer,
            varmap,
            device,
            batch_size: args.batch_size,
            epochs: args.epochs,
        })
    }

    pub fn train(
        &mut self,
        dataset: &mut Dataset,
        stopper: &mut EarlyStopping,
        rng: &mut StdRng,
        interrupted: &AtomicBool,
    ) -> Result<Metrics, Box<dyn Error>> {
        for epoch in 1..=self.epochs {
            if interrupted.load(Ordering::Relaxed) {
                log::info!("Interrupted before epoch {}", epoch);
                break;
            }

            dataset.shuffle_train(rng);
            let num_batches = dataset.num_train_batches(self.batch_size);
            let progress = TrainingProgressBar::new(epoch, num_batches)?;

            let train_loss = self.train_epoch(dataset, &progress)?;
            let metrics = self.evaluate(dataset)?;
            progress.finish(train_loss, metrics.val_loss as f32, metrics.val_acc as f32);

            // Snapshot failures abort training
            stopper.observe(&self.varmap, metrics)?;

            if stopper.should_stop() {
                log::info!("Early stopping after {} epochs", epoch);
                break;
            }
        }

        self.restore_best(stopper)?;
        let best = self.evaluate(dataset)?;
        log::info!(
            "Best model: val_loss {:.6}, val_acc {:.4}",
            best.val_loss,
            best.val_acc
        );

        Ok(best)
    }

    fn train_epoch(
        &mut self,
        dataset: &Dataset,
        progress: &TrainingProgressBar,
    ) -> Result<f32, Box<dyn Error>> {
        let mut total_loss = 0.0;
        let mut batches = 0;

        for batch in dataset.train_batches(self.batch_size, &self.device) {
            let (x, y) = batch?;
            let logits = self.network.forward(&x)?;
            let loss = cross_entropy(&logits, &y)?;
            self.optimizer.backward_step(&loss)?;

            total_loss += loss.to_scalar::<f32>()?;
            batches += 1;
            progress.update(total_loss / batches as f32);
        }

        Ok(total_loss / batches.max(1) as f32)
    }

    fn evaluate(&self, dataset: &Dataset) -> Result<Metrics, Box<dyn Error>> {
        let mut total_loss = 0.0;
        let mut total_correct = 0.0;
        let mut batches = 0;
        let mut samples = 0;

        for batch in dataset.val_batches(self.batch_size, &self.device) {
            let (x, y) = batch?;
            let logits = self.network.forward(&x)?;

            total_loss += cross_entropy(&logits, &y)?.to_scalar::<f32>()? as f64;
            total_correct += correct(&logits, &y)? as f64;
            batches += 1;
            samples += y.dim(0)?;
        }

        Ok(Metrics::new(
            total_loss / batches.max(1) as f64,
            total_correct / samples.max(1) as f64,
        ))
    }

    fn restore_best(&mut self, stopper: &EarlyStopping) -> Result<(), Box<dyn Error>> {
        // Only a snapshot written during this run is trusted
        if stopper.best_score().is_none() {
            return Ok(());
        }

        let path = stopper.dump_file();
        if path.exists() {
            log::info!("Restoring best model from {}", path.display());
            checkpoint::load(&mut self.varmap, path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use ett::{EarlyStoppingConfig, Monitor, Rngs};

    #[test]
    fn test_training_improves_and_saves_best_model() {
        let dir = tempfile::tempdir().unwrap();
        let dump_file = dir.path().join("best.safetensors");
        let args = Args::parse_from(["train", "--epochs", "5", "--samples", "512"]);

        let mut rngs = Rngs::new(5);
        let mut dataset = Dataset::synthetic(512, 0.25, &mut rngs.numeric, &mut rngs.general);
        let mut stopper = EarlyStopping::new(EarlyStoppingConfig {
            patience: 10,
            monitor: Monitor::ValLoss,
            dump_file: dump_file.clone(),
            ..EarlyStoppingConfig::default()
        })
        .unwrap();

        let mut trainer = Trainer::new(&args, Device::Cpu).unwrap();
        let best = trainer
            .train(&mut dataset, &mut stopper, &mut rngs.general, &AtomicBool::new(false))
            .unwrap();

        assert!(dump_file.exists());
        assert!(stopper.best_score().is_some());
        assert!(best.val_acc > 0.5);
    }

    #[test]
    fn test_interrupt_skips_training() {
        let dir = tempfile::tempdir().unwrap();
        let dump_file = dir.path().join("best.safetensors");
        let args = Args::parse_from(["train", "--epochs", "3"]);

        let mut rngs = Rngs::new(9);
        let mut dataset = Dataset::synthetic(64, 0.25, &mut rngs.numeric, &mut rngs.general);
        let mut stopper = EarlyStopping::new(EarlyStoppingConfig {
            dump_file: dump_file.clone(),
            ..EarlyStoppingConfig::default()
        })
        .unwrap();

        let mut trainer = Trainer::new(&args, Device::Cpu).unwrap();
        trainer
            .train(&mut dataset, &mut stopper, &mut rngs.general, &AtomicBool::new(true))
            .unwrap();

        assert!(!dump_file.exists());
        assert!(stopper.best_score().is_none());
    }

    #[test]
    fn test_stale_snapshot_from_previous_run_is_not_restored() {
        let dir = tempfile::tempdir().unwrap();
        let dump_file = dir.path().join("best.safetensors");
        std::fs::write(&dump_file, b"weights from an older run").unwrap();
        let args = Args::parse_from(["train", "--epochs", "3"]);

        let mut rngs = Rngs::new(9);
        let mut dataset = Dataset::synthetic(64, 0.25, &mut rngs.numeric, &mut rngs.general);
        let mut stopper = EarlyStopping::new(EarlyStoppingConfig {
            dump_file: dump_file.clone(),
            ..EarlyStoppingConfig::default()
        })
        .unwrap();

        let mut trainer = Trainer::new(&args, Device::Cpu).unwrap();
        trainer
            .train(&mut dataset, &mut stopper, &mut rngs.general, &AtomicBool::new(true))
            .unwrap();

        assert_eq!(
            std::fs::read(&dump_file).unwrap(),
            b"weights from an older run"
        );
    }
}
