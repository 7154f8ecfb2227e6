use clap::Parser;
use ett::device::{gpustat, select, DEFAULT_MIN_MEMORY_MB};
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};
use std::error::Error;

#[derive(Parser, Debug)]
#[command(name = "gpustat")]
#[command(author = "ETT Developers")]
#[command(version = "0.2.0")]
struct Args {
    /// Preferred CUDA device ordinal.
    #[arg(long)]
    prefer: Option<usize>,

    /// Minimum free memory (MB) a GPU needs to be selected.
    #[arg(long, default_value_t = DEFAULT_MIN_MEMORY_MB)]
    min_memory: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    SimpleLogger::init(LevelFilter::Info, Config::default())?;

    let stat = gpustat();
    match &stat {
        Some(stat) => stat.log(),
        None => log::info!("No accelerator available"),
    }

    let selection = select(stat.as_ref(), args.prefer, args.min_memory);
    log::info!("Selected device: {}", selection);

    Ok(())
}
