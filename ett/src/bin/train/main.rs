mod args;
mod data;
mod model;
mod progress;
mod trainer;

use args::Args;
use chrono::Local;
use clap::Parser;
use data::Dataset;
use ett::{auto_selection, manual_seed, EarlyStopping, Rngs};
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};
use std::{
    error::Error,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use trainer::Trainer;

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    // Set up SIGINT handler
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_handler = Arc::clone(&interrupted);

    ctrlc::set_handler(move || {
        log::info!("Received SIGINT, stopping after the current epoch...");
        interrupted_handler.store(true, Ordering::Relaxed);
    })?;

    let dump_file = args.dump_file.clone().unwrap_or_else(default_dump_file);
    let mut stopper = EarlyStopping::new(args.early_stopping(dump_file)?)?;

    let device = auto_selection(args.device, args.min_memory);
    let mut rngs = match manual_seed(args.seed, &device)? {
        Some(rngs) => rngs,
        None => Rngs::new(rand::random()),
    };

    let mut dataset = Dataset::synthetic(
        args.samples,
        args.val_ratio,
        &mut rngs.numeric,
        &mut rngs.general,
    );

    log::info!(
        "Training for up to {} epochs, monitoring {}",
        args.epochs,
        stopper.monitor()
    );
    let mut trainer = Trainer::new(&args, device)?;
    trainer.train(&mut dataset, &mut stopper, &mut rngs.general, &interrupted)?;

    log::info!("Best model saved to {}", stopper.dump_file().display());
    Ok(())
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::init(level, Config::default())?;

    Ok(args)
}

fn default_dump_file() -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d-%H%M%S");
    PathBuf::from(format!("runs/{}/model.safetensors", timestamp))
}
