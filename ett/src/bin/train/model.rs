use candle_core::{DType, Device, Result as CandleResult, Tensor, D};
use candle_nn::{linear, loss, Linear, Module, VarBuilder, VarMap};

use crate::data::{NUM_CLASSES, NUM_FEATURES};

const HIDDEN_SIZE: usize = 32;

pub struct Classifier {
    hidden: Linear,
    output: Linear,
}

impl Classifier {
    pub fn new(vs: &VarBuilder) -> CandleResult<Self> {
        Ok(Self {
            hidden: linear(NUM_FEATURES, HIDDEN_SIZE, vs.pp("hidden"))?,
            output: linear(HIDDEN_SIZE, NUM_CLASSES, vs.pp("output"))?,
        })
    }
}

impl Module for Classifier {
    fn forward(&self, x: &Tensor) -> CandleResult<Tensor> {
        x.apply(&self.hidden)?.relu()?.apply(&self.output)
    }
}

pub fn create_classifier(device: &Device) -> CandleResult<(Classifier, VarMap)> {
    let varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let net = Classifier::new(&vs)?;
    Ok((net, varmap))
}

pub fn cross_entropy(logits: &Tensor, labels: &Tensor) -> CandleResult<Tensor> {
    loss::cross_entropy(logits, labels)
}

/// Number of rows whose highest logit matches the label.
pub fn correct(logits: &Tensor, labels: &Tensor) -> CandleResult<f32> {
    logits
        .argmax(D::Minus1)?
        .eq(labels)?
        .to_dtype(DType::F32)?
        .sum_all()?
        .to_scalar::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shape() -> CandleResult<()> {
        let (net, _) = create_classifier(&Device::Cpu)?;
        let x = Tensor::zeros((5, NUM_FEATURES), DType::F32, &Device::Cpu)?;
        assert_eq!(net.forward(&x)?.dims(), &[5, NUM_CLASSES]);
        Ok(())
    }

    #[test]
    fn test_correct_counts_matches() -> CandleResult<()> {
        let logits = Tensor::new(&[[2.0f32, 1.0], [0.0, 3.0], [1.0, 0.5]], &Device::Cpu)?;
        let labels = Tensor::new(&[0u32, 1, 1], &Device::Cpu)?;
        assert_eq!(correct(&logits, &labels)?, 2.0);
        Ok(())
    }
}
