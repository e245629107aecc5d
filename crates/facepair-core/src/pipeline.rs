//! End-to-end probe evaluation: extract → pair with subjects → predict.

use crate::dataset::{build_dataset, pair_with_subjects, DatasetError};
use crate::extractor::{extract_face_with, ExtractError, FaceDetector, FaceSelector, FirstFace};
use crate::gallery::Subject;
use crate::predictor::{ClassPrediction, Predictor};
use crate::types::FEATURE_LEN;
use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("no reference subjects to compare against")]
    NoSubjects,
    #[error("network expects {network} input features, pair features have {features}")]
    InputWidth { network: usize, features: usize },
}

/// Prediction for one reference subject.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectPrediction {
    pub subject: String,
    #[serde(flatten)]
    pub prediction: ClassPrediction,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// One entry per subject, in subject order.
    pub predictions: Vec<SubjectPrediction>,
    /// True when any network layer runs on random parameters.
    pub degraded: bool,
}

/// Detector, selection policy and predictor wired together.
pub struct Pipeline<D, S = FirstFace> {
    detector: D,
    selector: S,
    predictor: Predictor,
}

impl<D: FaceDetector> Pipeline<D> {
    pub fn new(detector: D, predictor: Predictor) -> Self {
        Self {
            detector,
            selector: FirstFace,
            predictor,
        }
    }
}

impl<D: FaceDetector, S: FaceSelector> Pipeline<D, S> {
    /// Swap the multi-face selection policy.
    pub fn with_selector<T: FaceSelector>(self, selector: T) -> Pipeline<D, T> {
        Pipeline {
            detector: self.detector,
            selector,
            predictor: self.predictor,
        }
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Compare the face in `image` against every subject.
    pub fn run(
        &mut self,
        image: &DynamicImage,
        subjects: &[Subject],
    ) -> Result<PipelineOutput, PipelineError> {
        if subjects.is_empty() {
            return Err(PipelineError::NoSubjects);
        }
        let network = self.predictor.network();
        if let Some(width) = network.input_len() {
            if width != FEATURE_LEN {
                return Err(PipelineError::InputWidth {
                    network: width,
                    features: FEATURE_LEN,
                });
            }
        }

        let probe = extract_face_with(image, &mut self.detector, &self.selector)?;
        let features = build_dataset(pair_with_subjects(&probe, subjects))?;
        let predictions = self
            .predictor
            .classify(features.view())
            .into_iter()
            .zip(subjects)
            .map(|(prediction, subject)| SubjectPrediction {
                subject: subject.name.clone(),
                prediction,
            })
            .collect();

        let degraded = network.is_degraded();
        if degraded {
            tracing::warn!("predictions come from a network with randomly initialized layers");
        }
        tracing::info!(subjects = subjects.len(), degraded, "probe evaluated");

        Ok(PipelineOutput {
            predictions,
            degraded,
        })
    }
}
