//! Image inventory: one CSV row per photo under a directory tree.

use anyhow::{Context, Result};
use image::ImageReader;
use serde::Serialize;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const CORRUPTED: &str = "CORRUPTED";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub filename: String,
    pub path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_kb: f64,
    pub format: String,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Describe one file. Files that fail to decode get format `CORRUPTED`,
/// no dimensions and zero size.
pub fn describe(path: &Path) -> ImageRecord {
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let display_path = path.display().to_string();

    match probe(path) {
        Ok((width, height, format, bytes)) => ImageRecord {
            filename,
            path: display_path,
            width: Some(width),
            height: Some(height),
            size_kb: (bytes as f64 / 1024.0 * 100.0).round() / 100.0,
            format,
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable image");
            ImageRecord {
                filename,
                path: display_path,
                width: None,
                height: None,
                size_kb: 0.0,
                format: CORRUPTED.to_string(),
            }
        }
    }
}

fn probe(path: &Path) -> Result<(u32, u32, String, u64)> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .map(|f| format!("{f:?}").to_uppercase())
        .context("unrecognized image format")?;
    let (width, height) = reader.into_dimensions()?;
    let bytes = std::fs::metadata(path)?.len();
    Ok((width, height, format, bytes))
}

/// Collect records for every image file under `dir`, subdirectories
/// included, sorted by path.
pub fn scan(dir: &Path) -> Result<Vec<ImageRecord>> {
    let mut paths = Vec::new();
    collect_images(dir, &mut paths).with_context(|| format!("reading {}", dir.display()))?;
    paths.sort();
    Ok(paths.iter().map(|p| describe(p)).collect())
}

// Symlinked directories are not followed.
fn collect_images(dir: &Path, paths: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if let Err(e) = collect_images(&path, paths) {
                tracing::warn!(dir = %path.display(), error = %e, "skipping unreadable directory");
            }
        } else if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

pub fn write_csv(records: &[ImageRecord], output: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {}", output.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    tracing::info!(output = %output.display(), rows = records.len(), "metadata written");
    Ok(())
}
