//! Adam Configuration and Learning-Rate Schedule

use burn::optim::AdamConfig;
use tracing::info;

/// Adam with the given moment decay rates and denominator epsilon
pub(crate) fn adam(beta1: f64, beta2: f64, epsilon: f64) -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(beta1 as f32)
        .with_beta_2(beta2 as f32)
        .with_epsilon(epsilon as f32)
}

/// Multiplies the learning rate by `factor` after `patience` epochs without
/// improvement of the monitored loss
#[derive(Debug, Clone)]
pub struct PlateauSchedule {
    factor: f64,
    patience: usize,
    min_learning_rate: f64,
    best: f64,
    wait: usize,
}

impl PlateauSchedule {
    pub fn new(factor: f64, patience: usize, min_learning_rate: f64) -> Self {
        Self {
            factor,
            patience,
            min_learning_rate,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    /// Learning rate to use for the next epoch
    pub fn step(&mut self, monitored: f64, learning_rate: f64) -> f64 {
        if monitored < self.best {
            self.best = monitored;
            self.wait = 0;
            return learning_rate;
        }
        self.wait += 1;
        if self.wait >= self.patience && learning_rate > self.min_learning_rate {
            self.wait = 0;
            let reduced = (learning_rate * self.factor).max(self.min_learning_rate);
            info!("Reducing learning rate {:.2e} -> {:.2e}", learning_rate, reduced);
            return reduced;
        }
        learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{scalar, TrainBackend, DEVICE};
    use burn::nn::{Initializer, Linear, LinearConfig};
    use burn::optim::{GradientsParams, Optimizer};
    use burn::tensor::Tensor;

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let linear: Linear<TrainBackend> = LinearConfig::new(1, 1)
            .with_bias(false)
            .with_initializer(Initializer::Constant { value: 1.0 })
            .init(&DEVICE);
        let mut optimizer = adam(0.9, 0.999, 1e-7).init::<TrainBackend, Linear<TrainBackend>>();
        let x = Tensor::<TrainBackend, 2>::ones([1, 1], &DEVICE);
        let loss = linear.forward(x).powf_scalar(2.0).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &linear);
        let linear = optimizer.step(0.01, linear, grads);
        // Bias-corrected first step is lr regardless of gradient scale
        assert!((scalar(linear.weight.val().sum()) - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_plateau_halves_after_patience() {
        let mut schedule = PlateauSchedule::new(0.5, 2, 1e-4);
        let mut lr = 1e-3;
        lr = schedule.step(1.0, lr);
        lr = schedule.step(1.0, lr);
        assert_eq!(lr, 1e-3);
        lr = schedule.step(1.0, lr);
        assert_eq!(lr, 5e-4);
    }

    #[test]
    fn test_plateau_respects_floor() {
        let mut schedule = PlateauSchedule::new(0.5, 1, 1e-4);
        let mut lr = 1.5e-4;
        schedule.step(1.0, lr);
        lr = schedule.step(2.0, lr);
        assert_eq!(lr, 1e-4);
        lr = schedule.step(2.0, lr);
        assert_eq!(lr, 1e-4);
    }
}
