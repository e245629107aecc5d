use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Side length of a normalized face patch.
pub const PATCH_SIZE: usize = 50;
/// Number of pixels in one patch.
pub const PATCH_PIXELS: usize = PATCH_SIZE * PATCH_SIZE;
/// Length of one pair feature vector: reference patch followed by probe patch.
pub const FEATURE_LEN: usize = PATCH_PIXELS * 2;

const MAX_INTENSITY: f32 = 255.0;

/// Face region reported by a detector, in pixel coordinates of the frame.
///
/// `x`/`y` are signed because detectors may report boxes that begin
/// outside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect the box with a `frame_width` × `frame_height` frame.
    ///
    /// Returns `(x, y, width, height)` of the visible part, or `None` when
    /// nothing of the box lies inside the frame.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = (self.x as i64).clamp(0, frame_width as i64);
        let y0 = (self.y as i64).clamp(0, frame_height as i64);
        let x1 = (self.x as i64 + self.width as i64).clamp(0, frame_width as i64);
        let y1 = (self.y as i64 + self.height as i64).clamp(0, frame_height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// A 50×50 grayscale face patch with intensities scaled to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pixels: Array2<f32>,
}

impl Patch {
    /// Resize a grayscale crop to 50×50 (bilinear) and scale it to [0, 1].
    pub fn from_gray(crop: &GrayImage) -> Self {
        let size = PATCH_SIZE as u32;
        let resized = if crop.dimensions() == (size, size) {
            crop.clone()
        } else {
            imageops::resize(crop, size, size, FilterType::Triangle)
        };

        let pixels = Array2::from_shape_fn((PATCH_SIZE, PATCH_SIZE), |(row, col)| {
            resized.get_pixel(col as u32, row as u32)[0] as f32 / MAX_INTENSITY
        });

        Self { pixels }
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.pixels.view()
    }

    /// Render the patch back to 8-bit grayscale, e.g. for saving as a subject photo.
    pub fn to_gray_image(&self) -> GrayImage {
        let size = PATCH_SIZE as u32;
        GrayImage::from_fn(size, size, |x, y| {
            let v = self.pixels[[y as usize, x as usize]];
            Luma([(v * MAX_INTENSITY).round().clamp(0.0, MAX_INTENSITY) as u8])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_inside_frame() {
        let b = BoundingBox::new(50, 50, 100, 100);
        assert_eq!(b.clip(200, 200), Some((50, 50, 100, 100)));
    }

    #[test]
    fn test_clip_overhanging_box() {
        let b = BoundingBox::new(-10, 150, 40, 100);
        assert_eq!(b.clip(200, 200), Some((0, 150, 30, 50)));
    }

    #[test]
    fn test_clip_outside_frame() {
        let b = BoundingBox::new(300, 300, 10, 10);
        assert_eq!(b.clip(200, 200), None);
        let empty = BoundingBox::new(10, 10, 0, 5);
        assert_eq!(empty.clip(200, 200), None);
    }

    #[test]
    fn test_patch_from_large_crop_is_50x50() {
        let crop = GrayImage::from_pixel(120, 80, Luma([255]));
        let patch = Patch::from_gray(&crop);
        assert_eq!(patch.view().dim(), (PATCH_SIZE, PATCH_SIZE));
        assert!(patch.view().iter().all(|&v| (v - 1.0).abs() < 0.01));
    }

    #[test]
    fn test_patch_gray_roundtrip_keeps_pixels() {
        let crop = GrayImage::from_fn(50, 50, |x, y| Luma([((x + y) * 2) as u8]));
        let patch = Patch::from_gray(&crop);
        assert_eq!(patch.to_gray_image(), crop);
    }
}
