//! Face patch extraction.
//!
//! Converts a frame to grayscale, asks a [`FaceDetector`] for candidate
//! regions, picks one with a [`FaceSelector`] and normalizes the crop to a
//! 50×50 [`Patch`].

use crate::types::{BoundingBox, Patch};
use image::{DynamicImage, GrayImage};
use std::borrow::Cow;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("selected face region {0:?} lies outside the frame")]
    EmptyRegion(BoundingBox),
}

/// Face detection capability.
///
/// Implementations may be stateful (e.g. a cascade with scratch buffers),
/// hence `&mut self`.
pub trait FaceDetector {
    /// Return every face found in a grayscale frame, in detector order.
    fn detect(&mut self, frame: &GrayImage) -> Vec<BoundingBox>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, frame: &GrayImage) -> Vec<BoundingBox> {
        (**self).detect(frame)
    }
}

/// Policy for choosing one face when the detector reports several.
pub trait FaceSelector {
    fn select<'a>(&self, faces: &'a [BoundingBox]) -> Option<&'a BoundingBox>;
}

impl<S: FaceSelector + ?Sized> FaceSelector for Box<S> {
    fn select<'a>(&self, faces: &'a [BoundingBox]) -> Option<&'a BoundingBox> {
        (**self).select(faces)
    }
}

/// Take the first box in detector order. This is the default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFace;

impl FaceSelector for FirstFace {
    fn select<'a>(&self, faces: &'a [BoundingBox]) -> Option<&'a BoundingBox> {
        faces.first()
    }
}

/// Take the box with the largest area; ties go to the earlier box.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFace;

impl FaceSelector for LargestFace {
    fn select<'a>(&self, faces: &'a [BoundingBox]) -> Option<&'a BoundingBox> {
        let mut best: Option<&BoundingBox> = None;
        for face in faces {
            if best.map_or(true, |b| face.area() > b.area()) {
                best = Some(face);
            }
        }
        best
    }
}

/// Detector that reports the whole frame as a single face.
///
/// For probes and subject photos that are already cropped to the face.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullFrameDetector;

impl FaceDetector for FullFrameDetector {
    fn detect(&mut self, frame: &GrayImage) -> Vec<BoundingBox> {
        if frame.width() == 0 || frame.height() == 0 {
            return Vec::new();
        }
        vec![BoundingBox::new(0, 0, frame.width(), frame.height())]
    }
}

/// Decode an image file.
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage, ExtractError> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|source| ExtractError::ImageLoad {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "image loaded"
    );
    Ok(image)
}

/// Grayscale view of a frame. 8-bit single-channel frames are borrowed as-is.
pub fn to_grayscale(image: &DynamicImage) -> Cow<'_, GrayImage> {
    match image {
        DynamicImage::ImageLuma8(gray) => Cow::Borrowed(gray),
        other => Cow::Owned(other.to_luma8()),
    }
}

/// Extract a normalized face patch, taking the first detected face.
pub fn extract_face<D>(image: &DynamicImage, detector: &mut D) -> Result<Patch, ExtractError>
where
    D: FaceDetector + ?Sized,
{
    extract_face_with(image, detector, &FirstFace)
}

/// Extract a normalized face patch using an explicit selection policy.
pub fn extract_face_with<D, S>(
    image: &DynamicImage,
    detector: &mut D,
    selector: &S,
) -> Result<Patch, ExtractError>
where
    D: FaceDetector + ?Sized,
    S: FaceSelector + ?Sized,
{
    let gray = to_grayscale(image);
    let faces = detector.detect(&gray);
    tracing::debug!(faces = faces.len(), "detector returned");

    let face = *selector.select(&faces).ok_or(ExtractError::NoFaceDetected)?;
    let (x, y, width, height) = face
        .clip(gray.width(), gray.height())
        .ok_or(ExtractError::EmptyRegion(face))?;

    let crop = image::imageops::crop_imm(&*gray, x, y, width, height).to_image();
    Ok(Patch::from_gray(&crop))
}
