use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;

// Keeps the numeric stream from replaying the general-purpose one
const NUMERIC_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seeded generators for everything in a training run that draws random numbers.
#[derive(Debug, Clone)]
pub struct Rngs {
    /// Shuffling, splits and other general-purpose draws.
    pub general: StdRng,
    /// Synthetic data, noise and other numeric-array draws.
    pub numeric: StdRng,
}

impl Rngs {
    pub fn new(seed: u64) -> Self {
        Self {
            general: StdRng::seed_from_u64(seed),
            numeric: StdRng::seed_from_u64(seed ^ NUMERIC_STREAM),
        }
    }
}

/// Seeds the accelerator RNG of `device` and returns host generators seeded the same way.
///
/// A zero seed leaves everything untouched and returns `None`.
pub fn manual_seed(seed: u64, device: &Device) -> candle_core::Result<Option<Rngs>> {
    if seed == 0 {
        return Ok(None);
    }

    // The CPU backend draws from the thread rng and cannot be seeded
    if !device.is_cpu() {
        device.set_seed(seed)?;
    }

    log::debug!("Seeded random number generators with {}", seed);
    Ok(Some(Rngs::new(seed)))
}
