use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Nonlinearity applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    ReLU,
    /// Row-wise normalized exponential; each output row sums to 1.
    Softmax,
    /// Identity, for when raw scores are compared downstream.
    Linear,
}

impl Activation {
    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        match self {
            Activation::ReLU => input.mapv(|x| x.max(0.0)),
            Activation::Softmax => softmax_rows(input),
            Activation::Linear => input.to_owned(),
        }
    }
}

/// Softmax per row, shifted by the row max so large scores cannot overflow.
fn softmax_rows(input: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut output = input.to_owned();
    for mut row in output.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }
    output
}
