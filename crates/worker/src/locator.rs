//! Subject locators.
//!
//! [`FullFrameLocator`] treats each upload as an already-cropped face.
//! [`CommandLocator`] delegates detection to an external program: the image
//! goes to its stdin as PNG and a JSON list of boxes comes back on stdout.

use std::io::Cursor;
use std::time::Duration;

use emoti_core::collaborator::{MediaError, Region, SubjectLocator};
use image::{GrayImage, ImageFormat};
use serde::Deserialize;
use tokio::process::Command;

use crate::process::{run_piped, BlockingRuntime};

/// Default wall-clock limit for one detection call.
pub const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Treats the whole frame as the single subject.
///
/// Suitable when uploads are already cropped to a face (for example frames
/// captured by a client that does its own detection). Empty images yield
/// no region.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullFrameLocator;

impl SubjectLocator for FullFrameLocator {
    fn locate(&self, image: &GrayImage) -> Result<Vec<Region>, MediaError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![Region::full(image)])
    }
}

/// One detected box, as `[x, y, w, h]` or `{"x", "y", "width", "height"}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectedBox {
    Tuple([u32; 4]),
    Named {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl From<DetectedBox> for Region {
    fn from(found: DetectedBox) -> Self {
        match found {
            DetectedBox::Tuple([x, y, width, height]) => Region::new(x, y, width, height),
            DetectedBox::Named {
                x,
                y,
                width,
                height,
            } => Region::new(x, y, width, height),
        }
    }
}

/// [`SubjectLocator`] that runs an external face detector per image.
///
/// An empty JSON array means no face was found. Zero-sized boxes are
/// discarded.
#[derive(Debug, Clone)]
pub struct CommandLocator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLocator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from a whitespace-separated command line. `None` when blank.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }
}

impl SubjectLocator for CommandLocator {
    fn locate(&self, image: &GrayImage) -> Result<Vec<Region>, MediaError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| MediaError::Encode(e.to_string()))?;

        let runtime = BlockingRuntime::acquire().map_err(|e| MediaError::Locate(e.to_string()))?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let output = runtime
            .block_on(run_piped(&mut cmd, Some(png.get_ref()), self.timeout))
            .map_err(|e| MediaError::Locate(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(MediaError::Locate(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let regions = parse_regions(&output.stdout)?;
        tracing::debug!(program = %self.program, faces = regions.len(), "Located subjects");
        Ok(regions)
    }
}

fn parse_regions(stdout: &[u8]) -> Result<Vec<Region>, MediaError> {
    let text = String::from_utf8_lossy(stdout);
    let boxes: Vec<DetectedBox> = serde_json::from_str(text.trim()).map_err(|e| {
        MediaError::Locate(format!("invalid detector output ({e}): {}", text.trim()))
    })?;

    Ok(boxes
        .into_iter()
        .map(Region::from)
        .filter(|r| r.width > 0 && r.height > 0)
        .collect())
}
