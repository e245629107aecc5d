use crate::weights::{WeightError, WeightStore};
use ndarray::{Array2, ArrayView2};
use rand::Rng;

// Random init draws W from 0.1 * U[0, 1) - 0.05.
const INIT_SCALE: f32 = 0.1;
const INIT_OFFSET: f32 = -0.05;

/// Where a layer's parameters came from. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSource {
    /// Read from the weight store.
    Loaded,
    /// Randomly initialized on request.
    Random,
    /// Randomly initialized because loading failed.
    Fallback { reason: String },
}

impl ParamSource {
    /// True when the layer is not running on trained parameters.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ParamSource::Loaded)
    }
}

/// Fully connected layer computing `input · W + b`.
#[derive(Debug, Clone)]
pub struct Dense {
    weights: Array2<f32>,
    biases: Array2<f32>,
    source: ParamSource,
}

impl Dense {
    /// Small uniform weights around zero and zero biases.
    pub fn random<R: Rng + ?Sized>(inputs: usize, neurons: usize, rng: &mut R) -> Self {
        let weights = Array2::from_shape_fn((inputs, neurons), |_| {
            INIT_SCALE * rng.gen::<f32>() + INIT_OFFSET
        });
        Self {
            weights,
            biases: Array2::zeros((1, neurons)),
            source: ParamSource::Random,
        }
    }

    /// Wrap existing parameters. `biases` must be a single row matching the
    /// number of weight columns.
    pub fn from_parameters(weights: Array2<f32>, biases: Array2<f32>) -> Result<Self, WeightError> {
        let expected = (1, weights.ncols());
        if biases.dim() != expected {
            return Err(WeightError::ShapeMismatch {
                name: "biases".to_string(),
                expected: vec![expected.0, expected.1],
                actual: biases.shape().to_vec(),
            });
        }
        Ok(Self {
            weights,
            biases,
            source: ParamSource::Loaded,
        })
    }

    /// Load layer `index` (1-based) from the store and check its shape.
    pub fn load(
        store: &WeightStore,
        index: usize,
        inputs: usize,
        neurons: usize,
    ) -> Result<Self, WeightError> {
        let (weights, biases) = store.load_layer(index)?;
        if weights.dim() != (inputs, neurons) {
            return Err(WeightError::ShapeMismatch {
                name: store.weights_path(index).display().to_string(),
                expected: vec![inputs, neurons],
                actual: weights.shape().to_vec(),
            });
        }
        Self::from_parameters(weights, biases).map_err(|e| match e {
            WeightError::ShapeMismatch { expected, actual, .. } => WeightError::ShapeMismatch {
                name: store.biases_path(index).display().to_string(),
                expected,
                actual,
            },
            other => other,
        })
    }

    /// Load layer `index`, falling back to random parameters on any failure.
    ///
    /// The fallback is recorded in [`Dense::source`] and logged at `warn`.
    pub fn load_or_random<R: Rng + ?Sized>(
        store: &WeightStore,
        index: usize,
        inputs: usize,
        neurons: usize,
        rng: &mut R,
    ) -> Self {
        match Self::load(store, index, inputs, neurons) {
            Ok(layer) => {
                tracing::debug!(layer = index, inputs, neurons, "pretrained parameters loaded");
                layer
            }
            Err(e) => {
                tracing::warn!(
                    layer = index,
                    error = %e,
                    "pretrained parameters unavailable; using random initialization"
                );
                let mut layer = Self::random(inputs, neurons, rng);
                layer.source = ParamSource::Fallback {
                    reason: e.to_string(),
                };
                layer
            }
        }
    }

    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        assert_eq!(
            input.ncols(),
            self.inputs(),
            "dense layer expects {} input columns",
            self.inputs()
        );
        input.dot(&self.weights) + &self.biases
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn neurons(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.weights.view()
    }

    pub fn biases(&self) -> ArrayView2<'_, f32> {
        self.biases.view()
    }

    pub fn source(&self) -> &ParamSource {
        &self.source
    }
}
