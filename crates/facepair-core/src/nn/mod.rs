//! Hand-rolled feed-forward network: dense layers, activations and the
//! stage stack that runs the forward pass.

pub mod activation;
pub mod layer;
pub mod network;

pub use activation::Activation;
pub use layer::{Dense, ParamSource};
pub use network::{Network, NetworkError, NetworkSpec, Stage};
