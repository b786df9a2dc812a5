//! Burn Module Definitions
//!
//! The backend type carries the train/eval distinction: on [`TrainBackend`]
//! batch normalization uses batch statistics and dropout is active, while the
//! [`InferenceBackend`] module obtained through `valid()` uses the running
//! statistics and skips dropout.

use crate::error::TrainError;
use crate::network::NetworkConfig;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, LeakyRelu, LeakyReluConfig,
    Linear, LinearConfig,
};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use ndarray::{Array2, ArrayView2};

/// Evaluation-mode backend
pub type InferenceBackend = NdArray<f64>;

/// Training-mode backend
pub type TrainBackend = Autodiff<InferenceBackend>;

pub(crate) const DEVICE: NdArrayDevice = NdArrayDevice::Cpu;

/// He-uniform: bound `sqrt(6 / fan_in)`
fn he_uniform() -> Initializer {
    Initializer::KaimingUniform {
        gain: std::f64::consts::SQRT_2,
        fan_out_only: false,
    }
}

/// Linear → BatchNorm → LeakyReLU → Dropout
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    linear: Linear<B>,
    norm: BatchNorm<B, 0>,
    activation: LeakyRelu,
    dropout: Dropout,
}

impl<B: Backend> Block<B> {
    fn new(fan_in: usize, width: usize, dropout: f64, config: &NetworkConfig, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(fan_in, width)
                .with_initializer(he_uniform())
                .init(device),
            // burn weighs the new batch by `momentum`, the inverse of the config convention
            norm: BatchNormConfig::new(width)
                .with_momentum(1.0 - config.batch_norm_momentum)
                .with_epsilon(config.batch_norm_epsilon)
                .init(device),
            activation: LeakyReluConfig::new()
                .with_negative_slope(config.leaky_slope)
                .init(),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear.forward(input);
        let x = self.norm.forward(x);
        let x = self.activation.forward(x);
        self.dropout.forward(x)
    }

    pub fn width(&self) -> usize {
        self.linear.weight.val().dims()[1]
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout.prob
    }
}

/// Hidden blocks followed by a linear output layer producing logits
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    blocks: Vec<Block<B>>,
    output: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    /// Fresh weights drawn from the backend generator
    pub fn new(input_dim: usize, n_classes: usize, config: &NetworkConfig, device: &B::Device) -> Self {
        let mut fan_in = input_dim;
        let mut blocks = Vec::with_capacity(config.hidden_layers.len());
        for (i, &width) in config.hidden_layers.iter().enumerate() {
            let dropout = if i < config.dropout_blocks {
                config.dropout_rate
            } else {
                0.0
            };
            blocks.push(Block::new(fan_in, width, dropout, config, device));
            fan_in = width;
        }
        let output = LinearConfig::new(fan_in, n_classes)
            .with_initializer(he_uniform())
            .init(device);
        Self { blocks, output }
    }

    /// Unnormalized class scores
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .blocks
            .iter()
            .fold(input, |x, block| block.forward(x));
        self.output.forward(x)
    }

    pub fn blocks(&self) -> &[Block<B>] {
        &self.blocks
    }

    pub fn output_width(&self) -> usize {
        self.output.weight.val().dims()[1]
    }

    /// Sum of squared kernel entries over every linear layer, biases excluded
    pub fn squared_weight_norm(&self) -> Tensor<B, 1> {
        self.blocks.iter().fold(
            self.output.weight.val().powf_scalar(2.0).sum(),
            |total, block| total + block.linear.weight.val().powf_scalar(2.0).sum(),
        )
    }
}

/// Label-smoothed cross-entropy on logits
pub(crate) fn loss_function<B: Backend>(smoothing: f64, device: &B::Device) -> CrossEntropyLoss<B> {
    CrossEntropyLossConfig::new()
        .with_smoothing((smoothing > 0.0).then_some(smoothing as f32))
        .init(device)
}

pub(crate) fn matrix_tensor<B: Backend>(matrix: ArrayView2<'_, f64>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = matrix.dim();
    let values: Vec<f64> = matrix.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, [rows, cols]), device)
}

pub(crate) fn class_tensor<B: Backend>(targets: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = targets.iter().map(|&t| t as i64).collect();
    Tensor::from_data(TensorData::new(values, [targets.len()]), device)
}

pub(crate) fn tensor_matrix<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f64>, TrainError> {
    let [rows, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| TrainError::Backend(format!("{:?}", e)))?;
    Array2::from_shape_vec((rows, cols), values).map_err(|e| TrainError::Backend(e.to_string()))
}

pub(crate) fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::module::AutodiffModule;
    use ndarray::array;

    fn config() -> NetworkConfig {
        NetworkConfig {
            hidden_layers: vec![6, 4],
            dropout_blocks: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_block_layout() {
        let mlp = Mlp::<InferenceBackend>::new(3, 2, &config(), &DEVICE);
        let widths: Vec<usize> = mlp.blocks().iter().map(Block::width).collect();
        assert_eq!(widths, vec![6, 4]);
        let rates: Vec<f64> = mlp.blocks().iter().map(Block::dropout_rate).collect();
        assert_eq!(rates, vec![0.3, 0.0]);
        assert_eq!(mlp.output_width(), 2);
    }

    #[test]
    fn test_he_uniform_bound() {
        let mlp = Mlp::<InferenceBackend>::new(3, 2, &config(), &DEVICE);
        let kernel = tensor_matrix(mlp.blocks[0].linear.weight.val()).unwrap();
        let limit = (6.0f64 / 3.0).sqrt();
        assert!(kernel.iter().all(|w| w.abs() <= limit));
    }

    #[test]
    fn test_train_backend_uses_batch_statistics() {
        let mlp = Mlp::<TrainBackend>::new(3, 2, &config(), &DEVICE);
        let x = array![[0.1, -0.3, 2.0], [1.0, 1.0, 1.0], [0.0, 0.5, -1.0]];
        let train = tensor_matrix(mlp.forward(matrix_tensor(x.view(), &DEVICE))).unwrap();
        let eval = tensor_matrix(mlp.valid().forward(matrix_tensor(x.view(), &DEVICE))).unwrap();
        assert_ne!(train, eval);
    }

    #[test]
    fn test_squared_weight_norm_matches_kernels() {
        let mlp = Mlp::<InferenceBackend>::new(2, 2, &config(), &DEVICE);
        let expected: f64 = mlp
            .blocks
            .iter()
            .map(|b| &b.linear)
            .chain(std::iter::once(&mlp.output))
            .map(|l| tensor_matrix(l.weight.val()).unwrap().mapv(|w| w * w).sum())
            .sum();
        assert!((scalar(mlp.squared_weight_norm()) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_matrix_round_trip_keeps_row_order() {
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let back = tensor_matrix(matrix_tensor::<InferenceBackend>(x.view(), &DEVICE)).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn test_smoothed_loss_exceeds_plain_on_confident_logits() {
        let logits = matrix_tensor::<InferenceBackend>(array![[20.0, -20.0]].view(), &DEVICE);
        let targets = class_tensor::<InferenceBackend>(&[0], &DEVICE);
        let plain = scalar(loss_function::<InferenceBackend>(0.0, &DEVICE).forward(logits.clone(), targets.clone()));
        let smoothed = scalar(loss_function::<InferenceBackend>(0.1, &DEVICE).forward(logits, targets));
        assert!(plain < 1e-6);
        assert!(smoothed > 0.5);
    }
}
