use super::activation::Activation;
use super::layer::{Dense, ParamSource};
use crate::types::FEATURE_LEN;
use crate::weights::{WeightError, WeightStore};
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("invalid network layout: {0}")]
    InvalidSpec(String),
    #[error("layers {layers:?} are running on random parameters")]
    WeightLoadDegraded { layers: Vec<usize> },
    #[error(transparent)]
    Weight(#[from] WeightError),
}

/// Layer sizes and activations of a feed-forward network.
///
/// `sizes[0]` is the input width; every following entry adds one dense layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub sizes: Vec<usize>,
    #[serde(default = "default_hidden")]
    pub hidden: Activation,
    #[serde(default = "default_output")]
    pub output: Activation,
}

fn default_hidden() -> Activation {
    Activation::ReLU
}

fn default_output() -> Activation {
    Activation::Softmax
}

impl Default for NetworkSpec {
    /// The 4-layer pair classifier: 5000 → 500 → 50 → 10 → 2.
    fn default() -> Self {
        Self::new(vec![FEATURE_LEN, 500, 50, 10, 2])
    }
}

impl NetworkSpec {
    /// ReLU hidden layers with a softmax output.
    pub fn new(sizes: Vec<usize>) -> Self {
        Self {
            sizes,
            hidden: default_hidden(),
            output: default_output(),
        }
    }

    pub fn with_output(mut self, output: Activation) -> Self {
        self.output = output;
        self
    }

    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.sizes.len() < 2 {
            return Err(NetworkError::InvalidSpec(format!(
                "need an input width and at least one layer, got {:?}",
                self.sizes
            )));
        }
        if let Some(pos) = self.sizes.iter().position(|&n| n == 0) {
            return Err(NetworkError::InvalidSpec(format!("size at position {pos} is zero")));
        }
        Ok(())
    }

    /// (inputs, neurons, activation) of each layer, in order.
    fn layers(&self) -> impl Iterator<Item = (usize, usize, Activation)> + '_ {
        let last = self.sizes.len() - 2;
        self.sizes.windows(2).enumerate().map(move |(i, pair)| {
            let activation = if i == last { self.output } else { self.hidden };
            (pair[0], pair[1], activation)
        })
    }
}

/// One dense layer and the activation applied to its output.
#[derive(Debug, Clone)]
pub struct Stage {
    pub layer: Dense,
    pub activation: Activation,
}

impl Stage {
    pub fn new(layer: Dense, activation: Activation) -> Self {
        Self { layer, activation }
    }

    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        self.activation.forward(self.layer.forward(input).view())
    }
}

/// Ordered stack of stages. Parameters are read-only once built, so a
/// network can be shared across threads and called re-entrantly.
#[derive(Debug, Clone)]
pub struct Network {
    stages: Vec<Stage>,
}

impl Network {
    /// Build from explicit stages. Adjacent stages must agree on width.
    pub fn new(stages: Vec<Stage>) -> Result<Self, NetworkError> {
        for (i, pair) in stages.windows(2).enumerate() {
            if pair[0].layer.neurons() != pair[1].layer.inputs() {
                return Err(NetworkError::InvalidSpec(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i + 1,
                    pair[0].layer.neurons(),
                    i + 2,
                    pair[1].layer.inputs()
                )));
            }
        }
        Ok(Self { stages })
    }

    /// Freshly initialized network.
    pub fn random<R: Rng + ?Sized>(spec: &NetworkSpec, rng: &mut R) -> Result<Self, NetworkError> {
        spec.validate()?;
        let stages = spec
            .layers()
            .map(|(inputs, neurons, activation)| {
                Stage::new(Dense::random(inputs, neurons, &mut *rng), activation)
            })
            .collect();
        Ok(Self { stages })
    }

    /// Load every layer from the store; any missing or malformed file is an error.
    pub fn load(spec: &NetworkSpec, store: &WeightStore) -> Result<Self, NetworkError> {
        spec.validate()?;
        let stages = spec
            .layers()
            .enumerate()
            .map(|(i, (inputs, neurons, activation))| {
                Dense::load(store, i + 1, inputs, neurons)
                    .map(|layer| Stage::new(layer, activation))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    /// Load every layer, falling back to random parameters per layer.
    ///
    /// Inspect [`Network::degraded_layers`] or call
    /// [`Network::require_pretrained`] before trusting the output.
    pub fn load_or_random<R: Rng + ?Sized>(
        spec: &NetworkSpec,
        store: &WeightStore,
        rng: &mut R,
    ) -> Result<Self, NetworkError> {
        spec.validate()?;
        let stages: Vec<Stage> = spec
            .layers()
            .enumerate()
            .map(|(i, (inputs, neurons, activation))| {
                let layer = Dense::load_or_random(store, i + 1, inputs, neurons, &mut *rng);
                Stage::new(layer, activation)
            })
            .collect();
        let network = Self { stages };

        let degraded = network.degraded_layers();
        if degraded.is_empty() {
            tracing::info!(
                dir = %store.dir().display(),
                model = store.model_name(),
                layers = network.stages.len(),
                "model weights loaded"
            );
        } else {
            tracing::warn!(
                dir = %store.dir().display(),
                model = store.model_name(),
                ?degraded,
                "model weights incomplete; predictions use random parameters"
            );
        }
        Ok(network)
    }

    /// Write every layer to the store.
    pub fn save(&self, store: &WeightStore) -> Result<(), WeightError> {
        for (i, stage) in self.stages.iter().enumerate() {
            store.save_layer(i + 1, stage.layer.weights(), stage.layer.biases())?;
        }
        tracing::info!(
            dir = %store.dir().display(),
            model = store.model_name(),
            layers = self.stages.len(),
            "model weights saved"
        );
        Ok(())
    }

    /// Run the forward pass and return the final stage's output.
    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut current = input.to_owned();
        for stage in &self.stages {
            current = stage.forward(current.view());
        }
        current
    }

    /// Run the forward pass and return every stage's output, in order.
    pub fn forward_trace(&self, input: ArrayView2<'_, f32>) -> Vec<Array2<f32>> {
        let mut outputs: Vec<Array2<f32>> = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let next = match outputs.last() {
                Some(prev) => stage.forward(prev.view()),
                None => stage.forward(input),
            };
            outputs.push(next);
        }
        outputs
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn input_len(&self) -> Option<usize> {
        self.stages.first().map(|s| s.layer.inputs())
    }

    pub fn output_len(&self) -> Option<usize> {
        self.stages.last().map(|s| s.layer.neurons())
    }

    /// 1-based indices of layers not running on loaded parameters.
    pub fn degraded_layers(&self) -> Vec<usize> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.layer.source().is_degraded())
            .map(|(i, _)| i + 1)
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.stages.iter().any(|s| s.layer.source().is_degraded())
    }

    /// Fail with [`NetworkError::WeightLoadDegraded`] unless every layer was loaded.
    pub fn require_pretrained(&self) -> Result<(), NetworkError> {
        let layers = self.degraded_layers();
        if layers.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::WeightLoadDegraded { layers })
        }
    }

    /// Sources of every layer, in order.
    pub fn sources(&self) -> impl Iterator<Item = &ParamSource> {
        self.stages.iter().map(|s| s.layer.source())
    }
}
