//! Image primitives shared by the motion engine and the docking controller.

pub mod annotate;
pub mod blobs;
pub mod regions;

use image::{imageops, GrayImage, Luma, RgbImage};

pub use blobs::{Blob, BlobDetector, BlobParams};
pub use regions::{find_regions, BoundingBox, Region};

/// Luma conversion of an RGB frame.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

/// Gaussian blur. A sigma of 3.5 matches a 21x21 kernel with automatic sigma.
pub fn blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return gray.clone();
    }
    imageops::blur(gray, sigma)
}

/// Per-pixel `|a - b|`. Images must share dimensions.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y).0[0].abs_diff(b.get_pixel(x, y).0[0])])
    })
}

/// Binary mask of pixels strictly above `threshold`.
pub fn threshold_mask(gray: &GrayImage, threshold: u8) -> Vec<bool> {
    gray.pixels().map(|p| p.0[0] > threshold).collect()
}
