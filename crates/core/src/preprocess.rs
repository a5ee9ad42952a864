//! Crop, resize and normalise a located face into classifier input.

use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::Serialize;

use crate::collaborator::Region;
use crate::types::Dimensions;

/// Largest pixel value of an 8-bit grayscale image.
const PIXEL_MAX: f32 = 255.0;

/// Model input in row-major HWC layout with values in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputTensor {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<f32>,
}

/// Crop `region` out of `image`, clamping it to the image bounds.
///
/// Returns `None` when nothing of the region lies inside the image.
pub fn crop_region(image: &GrayImage, region: Region) -> Option<GrayImage> {
    let (img_w, img_h) = image.dimensions();
    if region.x >= img_w || region.y >= img_h {
        return None;
    }
    let width = region.width.min(img_w - region.x);
    let height = region.height.min(img_h - region.y);
    if width == 0 || height == 0 {
        return None;
    }
    Some(imageops::crop_imm(image, region.x, region.y, width, height).to_image())
}

/// Resize to the model's expected dimensions.
pub fn resize_to(image: &GrayImage, (width, height): Dimensions) -> GrayImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Scale pixels into `0.0..=1.0`, repeating the grey value across
/// `channels` (3 for models trained on RGB input).
pub fn normalize(image: &GrayImage, channels: u8) -> InputTensor {
    let channels = channels.max(1);
    let data = image
        .pixels()
        .flat_map(|p| std::iter::repeat(f32::from(p.0[0]) / PIXEL_MAX).take(channels as usize))
        .collect();

    InputTensor {
        width: image.width(),
        height: image.height(),
        channels,
        data,
    }
}
