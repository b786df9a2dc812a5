//! Network Architecture and Forward Pass

use crate::error::TrainError;
use crate::model::{matrix_tensor, tensor_matrix, InferenceBackend, Mlp, MlpRecord, DEVICE};
use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

/// Architecture hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Hidden block widths (default: [128, 256, 128, 64])
    pub hidden_layers: Vec<usize>,
    /// Dropout rate after the leading blocks (default: 0.3)
    pub dropout_rate: f64,
    /// Number of leading blocks followed by dropout (default: 3)
    pub dropout_blocks: usize,
    /// LeakyReLU negative slope (default: 0.1)
    pub leaky_slope: f64,
    /// Weight of the previous running statistics per update (default: 0.9)
    pub batch_norm_momentum: f64,
    /// Variance epsilon (default: 1e-3)
    pub batch_norm_epsilon: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 256, 128, 64],
            dropout_rate: 0.3,
            dropout_blocks: 3,
            leaky_slope: 0.1,
            batch_norm_momentum: 0.9,
            batch_norm_epsilon: 1e-3,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.hidden_layers.is_empty() || self.hidden_layers.contains(&0) {
            return Err(TrainError::InvalidConfig(format!(
                "hidden layer widths must be positive, got {:?}",
                self.hidden_layers
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(TrainError::InvalidConfig(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.batch_norm_momentum) {
            return Err(TrainError::InvalidConfig(format!(
                "batch_norm_momentum must be in [0, 1], got {}",
                self.batch_norm_momentum
            )));
        }
        if self.batch_norm_epsilon <= 0.0 {
            return Err(TrainError::InvalidConfig(
                "batch_norm_epsilon must be positive".into(),
            ));
        }
        Ok(())
    }
}


type WeightRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// Evaluation-mode feed-forward classifier
///
/// Wraps the [`InferenceBackend`] module, so every prediction runs on the
/// running batch-norm statistics without dropout.
#[derive(Debug, Clone)]
pub struct Network {
    input_dim: usize,
    n_classes: usize,
    config: NetworkConfig,
    model: Mlp<InferenceBackend>,
}

/// On-disk form: architecture plus the burn record of the weights
#[derive(Serialize, Deserialize)]
struct SavedNetwork {
    input_dim: usize,
    n_classes: usize,
    config: NetworkConfig,
    weights: Vec<u8>,
}

impl Network {
    /// Initialise a fresh network with He-uniform weights drawn after seeding
    /// the backend generator with `seed`
    pub fn new(
        input_dim: usize,
        n_classes: usize,
        config: &NetworkConfig,
        seed: u64,
    ) -> Result<Self, TrainError> {
        check_shape(input_dim, n_classes, config)?;
        InferenceBackend::seed(seed);
        let model = Mlp::new(input_dim, n_classes, config, &DEVICE);
        let network = Self::from_model(input_dim, n_classes, config.clone(), model);
        debug!(
            "Initialised network {} -> {:?} -> {} ({} parameters)",
            input_dim,
            config.hidden_layers,
            n_classes,
            network.parameter_count()
        );
        Ok(network)
    }

    pub(crate) fn from_model(
        input_dim: usize,
        n_classes: usize,
        config: NetworkConfig,
        model: Mlp<InferenceBackend>,
    ) -> Self {
        Self {
            input_dim,
            n_classes,
            config,
            model,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn parameter_count(&self) -> usize {
        self.model.num_params()
    }

    pub(crate) fn model(&self) -> &Mlp<InferenceBackend> {
        &self.model
    }

    /// Row-wise class probabilities
    pub fn predict_proba(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, TrainError> {
        let logits = self.logits(input)?;
        tensor_matrix(softmax(logits, 1))
    }

    /// Argmax class indices
    pub fn predict(&self, input: ArrayView2<'_, f64>) -> Result<Vec<usize>, TrainError> {
        Ok(argmax_rows(&self.predict_proba(input)?))
    }

    pub(crate) fn logits(
        &self,
        input: ArrayView2<'_, f64>,
    ) -> Result<Tensor<InferenceBackend, 2>, TrainError> {
        if input.ncols() != self.input_dim {
            return Err(TrainError::ShapeMismatch {
                expected: format!("{} input features", self.input_dim),
                actual: input.ncols().to_string(),
            });
        }
        if input.nrows() == 0 {
            return Err(TrainError::EmptyDataset("input"));
        }
        Ok(self.model.forward(matrix_tensor(input, &DEVICE)))
    }

    fn weight_bytes(&self) -> Result<Vec<u8>, TrainError> {
        WeightRecorder::default()
            .record(self.model.clone().into_record(), ())
            .map_err(|e| TrainError::Backend(e.to_string()))
    }

    fn from_saved(saved: SavedNetwork) -> Result<Self, TrainError> {
        check_shape(saved.input_dim, saved.n_classes, &saved.config)?;
        let record: MlpRecord<InferenceBackend> = WeightRecorder::default()
            .load(saved.weights, &DEVICE)
            .map_err(|e| TrainError::Backend(e.to_string()))?;
        let model = Mlp::new(saved.input_dim, saved.n_classes, &saved.config, &DEVICE).load_record(record);
        Ok(Self::from_model(saved.input_dim, saved.n_classes, saved.config, model))
    }
}

pub(crate) fn check_shape(input_dim: usize, n_classes: usize, config: &NetworkConfig) -> Result<(), TrainError> {
    config.validate()?;
    if input_dim == 0 {
        return Err(TrainError::ShapeMismatch {
            expected: "at least 1 input feature".into(),
            actual: "0".into(),
        });
    }
    if n_classes < 2 {
        return Err(TrainError::TooFewClasses(n_classes));
    }
    Ok(())
}

/// Same architecture and identical recorded weights
impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.input_dim == other.input_dim
            && self.n_classes == other.n_classes
            && self.config == other.config
            && matches!((self.weight_bytes(), other.weight_bytes()), (Ok(a), Ok(b)) if a == b)
    }
}

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let weights = self.weight_bytes().map_err(serde::ser::Error::custom)?;
        SavedNetwork {
            input_dim: self.input_dim,
            n_classes: self.n_classes,
            config: self.config.clone(),
            weights,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let saved = SavedNetwork::deserialize(deserializer)?;
        Network::from_saved(saved).map_err(serde::de::Error::custom)
    }
}

/// Index of the largest value in each row (first wins on ties)
pub(crate) fn argmax_rows(probabilities: &Array2<f64>) -> Vec<usize> {
    probabilities
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    fn small() -> Network {
        let config = NetworkConfig {
            hidden_layers: vec![8, 4],
            dropout_blocks: 1,
            ..Default::default()
        };
        Network::new(3, 2, &config, 7).unwrap()
    }

    #[test]
    fn test_default_architecture() {
        let network = Network::new(14, 5, &NetworkConfig::default(), 42).unwrap();
        let widths: Vec<usize> = network.model().blocks().iter().map(|b| b.width()).collect();
        assert_eq!(widths, vec![128, 256, 128, 64]);
        let dropouts: Vec<f64> = network.model().blocks().iter().map(|b| b.dropout_rate()).collect();
        assert_eq!(dropouts, vec![0.3, 0.3, 0.3, 0.0]);
        assert_eq!(network.model().output_width(), 5);
        // Kernels and biases, plus gamma and beta per block
        let expected = (14 * 128 + 128 + 2 * 128)
            + (128 * 256 + 256 + 2 * 256)
            + (256 * 128 + 128 + 2 * 128)
            + (128 * 64 + 64 + 2 * 64)
            + (64 * 5 + 5);
        assert_eq!(network.parameter_count(), expected);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let network = small();
        let x = array![[0.1, -0.3, 2.0], [1.0, 1.0, 1.0]];
        let a = network.predict_proba(x.view()).unwrap();
        let b = network.predict_proba(x.view()).unwrap();
        assert_eq!(a, b);
        for row in a.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rows_are_scored_independently() {
        let network = small();
        let x = array![[0.1, -0.3, 2.0], [1.0, 1.0, 1.0]];
        let batch = network.predict_proba(x.view()).unwrap();
        let single = network.predict_proba(x.slice(ndarray::s![1..2, ..])).unwrap();
        for (a, b) in batch.row(1).iter().zip(single.row(0)) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_wrong_width() {
        let network = small();
        let x = array![[1.0, 2.0]];
        assert!(matches!(
            network.predict_proba(x.view()),
            Err(TrainError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_single_class() {
        assert_eq!(
            Network::new(3, 1, &NetworkConfig::default(), 0).unwrap_err(),
            TrainError::TooFewClasses(1)
        );
    }

    #[test]
    fn test_serde_round_trip_preserves_weights() {
        let network = small();
        let json = serde_json::to_string(&network).unwrap();
        let restored: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(network, restored);
        let x = array![[0.5, 0.5, -0.5]];
        assert_eq!(
            network.predict_proba(x.view()).unwrap(),
            restored.predict_proba(x.view()).unwrap()
        );
    }

    #[test]
    fn test_corrupt_weights_fail_to_load() {
        let json = serde_json::json!({
            "input_dim": 3,
            "n_classes": 2,
            "config": NetworkConfig::default(),
            "weights": [1, 2, 3],
        });
        assert!(serde_json::from_value::<Network>(json).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_probabilities_form_a_distribution(
            values in prop::collection::vec(-50.0f64..50.0, 3..=12)
        ) {
            let network = small();
            let rows = values.len() / 3;
            let x = Array2::from_shape_vec((rows, 3), values[..rows * 3].to_vec()).unwrap();
            let p = network.predict_proba(x.view()).unwrap();
            for row in p.rows() {
                prop_assert!((row.sum() - 1.0).abs() < 1e-9);
                prop_assert!(row.iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn test_argmax_rows() {
        let p = array![[0.2, 0.5, 0.3], [0.9, 0.05, 0.05]];
        assert_eq!(argmax_rows(&p), vec![1, 0]);
    }
}
