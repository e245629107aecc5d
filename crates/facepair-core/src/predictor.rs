//! Reduce network output to class indices and human-readable labels.

use crate::nn::Network;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Raw network output plus the arg-max class of every row.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub class_indices: Array1<usize>,
    pub raw_output: Array2<f32>,
}

/// Run `network` over `features` and take the arg-max of each output row.
pub fn predict(network: &Network, features: ArrayView2<'_, f32>) -> Prediction {
    let raw_output = network.forward(features);
    let class_indices = raw_output.map_axis(Axis(1), argmax);
    Prediction {
        class_indices,
        raw_output,
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Class index → label mapping supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// One row's outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassPrediction {
    pub class_index: usize,
    /// `None` when the label table has no entry for `class_index`.
    pub label: Option<String>,
    pub scores: Vec<f32>,
}

/// A network paired with the label table used to name its classes.
#[derive(Debug, Clone)]
pub struct Predictor {
    network: Network,
    labels: LabelTable,
}

impl Predictor {
    pub fn new(network: Network, labels: LabelTable) -> Self {
        if let Some(classes) = network.output_len() {
            if labels.len() < classes {
                tracing::warn!(
                    classes,
                    labels = labels.len(),
                    "label table does not cover every output class"
                );
            }
        }
        Self { network, labels }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn predict(&self, features: ArrayView2<'_, f32>) -> Prediction {
        predict(&self.network, features)
    }

    /// One labeled prediction per feature row, in row order.
    pub fn classify(&self, features: ArrayView2<'_, f32>) -> Vec<ClassPrediction> {
        let prediction = self.predict(features);
        prediction
            .class_indices
            .iter()
            .zip(prediction.raw_output.rows())
            .map(|(&class_index, scores)| ClassPrediction {
                class_index,
                label: self.labels.get(class_index).map(str::to_string),
                scores: scores.to_vec(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, Dense, NetworkSpec, Stage};
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn identity_network(width: usize, activation: Activation) -> Network {
        let layer = Dense::from_parameters(Array2::eye(width), Array2::zeros((1, width))).unwrap();
        Network::new(vec![Stage::new(layer, activation)]).unwrap()
    }

    #[test]
    fn test_predict_output_shape() {
        let spec = NetworkSpec::new(vec![5000, 10, 5, 3, 2]);
        let mut rng = StdRng::seed_from_u64(0);
        let net = Network::random(&spec, &mut rng).unwrap();
        let x = Array2::from_shape_fn((3, 5000), |_| rng.gen::<f32>());

        let p = predict(&net, x.view());
        assert_eq!(p.raw_output.dim(), (3, 2));
        assert_eq!(p.class_indices.len(), 3);
        assert!(p.class_indices.iter().all(|&c| c < 2));
    }

    #[test]
    fn test_predict_picks_largest_score() {
        let net = identity_network(3, Activation::Linear);
        let p = predict(&net, array![[0.1f32, 0.9, 0.3], [5.0, -1.0, 4.0], [0.0, 0.0, 2.0]].view());
        assert_eq!(p.class_indices.to_vec(), vec![1, 0, 2]);
    }

    #[test]
    fn test_argmax_ties_take_lowest_index() {
        assert_eq!(argmax(array![0.5f32, 0.5, 0.1].view()), 0);
        assert_eq!(argmax(array![0.1f32, 0.7, 0.7].view()), 1);
        assert_eq!(argmax(array![2.0f32].view()), 0);
    }

    #[test]
    fn test_label_table_lookup() {
        let labels: LabelTable = ["MML", "mml", "sol"].into_iter().collect();
        assert_eq!(labels.get(0), Some("MML"));
        assert_eq!(labels.get(2), Some("sol"));
        assert_eq!(labels.get(3), None);
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_classify_maps_labels_per_row() {
        let net = identity_network(2, Activation::Softmax);
        let predictor = Predictor::new(net, ["same", "different"].into_iter().collect());

        let out = predictor.classify(array![[3.0f32, 1.0], [0.0, 2.0]].view());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].class_index, 0);
        assert_eq!(out[0].label.as_deref(), Some("same"));
        assert_eq!(out[1].class_index, 1);
        assert_eq!(out[1].label.as_deref(), Some("different"));
        assert!((out[0].scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_classify_unknown_label() {
        let net = identity_network(3, Activation::Linear);
        let predictor = Predictor::new(net, ["only"].into_iter().collect());
        let out = predictor.classify(array![[0.0f32, 0.0, 1.0]].view());
        assert_eq!(out[0].class_index, 2);
        assert_eq!(out[0].label, None);
    }
}
