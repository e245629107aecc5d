//! facepair-core — face-pair similarity inference.
//!
//! Extracts a normalized 50×50 face patch from a probe image, pairs it with
//! reference subject patches and classifies each pair with a small dense
//! network whose parameters are stored as `.npy` files.

pub mod dataset;
pub mod extractor;
pub mod gallery;
pub mod nn;
pub mod pipeline;
pub mod predictor;
pub mod types;
pub mod weights;

pub use dataset::{build_dataset, pair_with_subjects, DatasetError};
pub use extractor::{
    extract_face, extract_face_with, load_image, ExtractError, FaceDetector, FaceSelector,
    FirstFace, FullFrameDetector, LargestFace,
};
pub use gallery::{load_subjects, GalleryError, Subject};
pub use nn::{Activation, Dense, Network, NetworkError, NetworkSpec, ParamSource, Stage};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput, SubjectPrediction};
pub use predictor::{predict, ClassPrediction, LabelTable, Prediction, Predictor};
pub use types::{BoundingBox, Patch, FEATURE_LEN, PATCH_SIZE};
pub use weights::{WeightError, WeightStore};

/// Model directory used when none is configured.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("model")
}
