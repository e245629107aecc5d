//! Reference subjects loaded from a directory of photos.

use crate::extractor::{load_image, to_grayscale};
use crate::types::Patch;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read subjects directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A named reference patch.
#[derive(Debug, Clone)]
pub struct Subject {
    pub name: String,
    pub patch: Patch,
}

impl Subject {
    pub fn new(name: impl Into<String>, patch: Patch) -> Self {
        Self {
            name: name.into(),
            patch,
        }
    }
}

/// Load every decodable image in `dir` as a subject, ordered by file name.
///
/// Photos are converted to grayscale and resized to a patch as a whole; they
/// are expected to be face crops already. Files that cannot be decoded are
/// skipped with a warning.
pub fn load_subjects(dir: &Path) -> Result<Vec<Subject>, GalleryError> {
    let io_err = |source| GalleryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut subjects = Vec::with_capacity(paths.len());
    for path in paths {
        let image = match load_image(&path) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unreadable subject photo"
                );
                continue;
            }
        };
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        subjects.push(Subject::new(name, Patch::from_gray(&to_grayscale(&image))));
    }

    tracing::info!(dir = %dir.display(), count = subjects.len(), "subjects loaded");
    Ok(subjects)
}
