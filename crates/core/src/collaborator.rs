//! Interfaces to the external collaborators a job drives.
//!
//! The job executor only ever talks to these traits. Concrete adapters live
//! in `emoti-worker`; tests substitute in-memory fakes. All implementations
//! are shared across concurrently running jobs, hence `Send + Sync`.

use std::path::Path;

use image::GrayImage;

use crate::preprocess::InputTensor;

/// Errors raised by media, detection and inference collaborators.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to decode media: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("subject location failed: {0}")]
    Locate(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering the whole of `image`.
    pub fn full(image: &GrayImage) -> Self {
        Self::new(0, 0, image.width(), image.height())
    }
}

/// Finds regions of interest (faces) in a grayscale image.
pub trait SubjectLocator: Send + Sync {
    /// Return zero or more regions. Order matters: image jobs use the first.
    fn locate(&self, image: &GrayImage) -> Result<Vec<Region>, MediaError>;
}

/// Runs a model over a preprocessed input tensor.
pub trait Classifier: Send + Sync {
    /// Return one score per class label.
    fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, MediaError>;
}

/// Still-image decoding and encoding.
pub trait ImageCodec: Send + Sync {
    /// Decode encoded image bytes into a grayscale pixel grid.
    fn decode_gray(&self, bytes: &[u8]) -> Result<GrayImage, MediaError>;

    /// Encode a grayscale pixel grid as JPEG.
    fn encode_jpeg(&self, image: &GrayImage) -> Result<Vec<u8>, MediaError>;
}

/// Opens video files as sequential frame sources.
pub trait VideoDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, MediaError>;
}

/// An open, sequentially decoded video stream.
///
/// Dropping the source releases the underlying decoder.
pub trait FrameSource: Send {
    /// Total frame count reported by the container, or 0 if unknown.
    fn total_frames(&self) -> u64;

    /// Decode the next frame as grayscale. `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<GrayImage>, MediaError>;
}
