use candle_core::{Device, Result as CandleResult, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

pub const NUM_FEATURES: usize = 8;
pub const NUM_CLASSES: usize = 2;

// Distance between the two class centers along every axis
const CLASS_SEPARATION: f32 = 1.5;

/// Two overlapping Gaussian blobs, one per class.
pub struct Dataset {
    features: Vec<f32>,
    labels: Vec<u32>,
    train_idx: Vec<usize>,
    val_idx: Vec<usize>,
}

impl Dataset {
    pub fn synthetic(
        num_samples: usize,
        val_ratio: f64,
        numeric: &mut StdRng,
        general: &mut StdRng,
    ) -> Self {
        let mut features = Vec::with_capacity(num_samples * NUM_FEATURES);
        let mut labels = Vec::with_capacity(num_samples);

        for i in 0..num_samples {
            let label = (i % NUM_CLASSES) as u32;
            let center = if label == 0 { 0.0 } else { CLASS_SEPARATION };
            features.extend((0..NUM_FEATURES).map(|_| center + gaussian(numeric)));
            labels.push(label);
        }

        let mut indices: Vec<usize> = (0..num_samples).collect();
        indices.shuffle(general);

        let val_len = (num_samples as f64 * val_ratio.clamp(0.0, 0.9)) as usize;
        let train_idx = indices.split_off(val_len);

        log::info!(
            "Generated {} samples ({} train, {} validation)",
            num_samples,
            train_idx.len(),
            indices.len()
        );

        Self {
            features,
            labels,
            train_idx,
            val_idx: indices,
        }
    }

    pub fn shuffle_train(&mut self, rng: &mut StdRng) {
        self.train_idx.shuffle(rng);
    }

    pub fn num_train_batches(&self, batch_size: usize) -> usize {
        self.train_idx.len().div_ceil(batch_size.max(1))
    }

    pub fn train_batches<'a>(
        &'a self,
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = CandleResult<(Tensor, Tensor)>> + 'a {
        self.batches(&self.train_idx, batch_size, device)
    }

    pub fn val_batches<'a>(
        &'a self,
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = CandleResult<(Tensor, Tensor)>> + 'a {
        self.batches(&self.val_idx, batch_size, device)
    }

    fn batches<'a>(
        &'a self,
        indices: &'a [usize],
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = CandleResult<(Tensor, Tensor)>> + 'a {
        indices
            .chunks(batch_size.max(1))
            .map(move |chunk| self.batch(chunk, device))
    }

    fn batch(&self, chunk: &[usize], device: &Device) -> CandleResult<(Tensor, Tensor)> {
        let mut x = Vec::with_capacity(chunk.len() * NUM_FEATURES);
        let mut y = Vec::with_capacity(chunk.len());
        for &i in chunk {
            x.extend_from_slice(&self.features[i * NUM_FEATURES..(i + 1) * NUM_FEATURES]);
            y.push(self.labels[i]);
        }

        let x = Tensor::from_vec(x, (chunk.len(), NUM_FEATURES), device)?;
        let y = Tensor::from_vec(y, chunk.len(), device)?;
        Ok((x, y))
    }
}

// Box-Muller transform
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}
