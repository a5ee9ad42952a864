//! Media codec adapters.
//!
//! - [`ImageCrateCodec`] decodes and encodes stills with the `image` crate.
//! - [`FfmpegVideoDecoder`] reads video metadata with `ffprobe` and streams
//!   grayscale frames out of `ffmpeg` as raw bytes.
//!
//! The video adapter runs inside the blocking job worker and drives its
//! child processes through [`BlockingRuntime`]. Every metadata query and
//! every frame read is bounded by a timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use emoti_core::collaborator::{FrameSource, ImageCodec, MediaError, VideoDecoder};
use image::codecs::jpeg::JpegEncoder;
use image::GrayImage;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};

use crate::process::{run_piped, BlockingRuntime, ProcessError};

/// JPEG quality used for face snapshots.
const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Wall-clock limit for reading a video's metadata.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest wait for `ffmpeg` to produce the next frame.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Still images
// ---------------------------------------------------------------------------

/// [`ImageCodec`] backed by the `image` crate (PNG, JPEG, WebP).
#[derive(Debug, Clone, Copy)]
pub struct ImageCrateCodec {
    jpeg_quality: u8,
}

impl ImageCrateCodec {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }
}

impl Default for ImageCrateCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode_gray(&self, bytes: &[u8]) -> Result<GrayImage, MediaError> {
        image::load_from_memory(bytes)
            .map(|img| img.to_luma8())
            .map_err(|e| MediaError::Decode(e.to_string()))
    }

    fn encode_jpeg(&self, image: &GrayImage) -> Result<Vec<u8>, MediaError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality)
            .encode_image(image)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// ffprobe output
// ---------------------------------------------------------------------------

/// Subset of `ffprobe -print_format json -show_streams` output.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    /// e.g. "30/1" or "24000/1001"
    r_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
}

/// Dimensions and frame count of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VideoMeta {
    width: u32,
    height: u32,
    total_frames: u64,
}

impl FfprobeStream {
    /// Prefer the container's frame count; otherwise estimate it from
    /// duration and frame rate. 0 when neither is available.
    fn frame_count(&self) -> u64 {
        if let Some(n) = self.nb_frames.as_deref().and_then(|v| v.parse::<u64>().ok()) {
            if n > 0 {
                return n;
            }
        }
        let duration = self.duration.as_deref().and_then(|v| v.parse::<f64>().ok());
        let fps = self.r_frame_rate.as_deref().and_then(parse_frame_rate);
        match (duration, fps) {
            (Some(d), Some(f)) if d > 0.0 && f > 0.0 => (d * f).round() as u64,
            _ => 0,
        }
    }
}

/// Parse an ffprobe rational like `"30000/1001"`.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => raw.trim().parse().ok(),
    }
}

fn parse_probe(stdout: &[u8]) -> Result<VideoMeta, MediaError> {
    let output: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::Decode(format!("failed to parse ffprobe output: {e}")))?;

    let stream = output
        .streams
        .iter()
        .find(|s| s.width.is_some() && s.height.is_some())
        .ok_or_else(|| MediaError::Decode("no video stream found".into()))?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(VideoMeta {
            width,
            height,
            total_frames: stream.frame_count(),
        }),
        _ => Err(MediaError::Decode("video stream has no dimensions".into())),
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// [`VideoDecoder`] that shells out to `ffprobe` / `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegVideoDecoder {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    probe_timeout: Duration,
    frame_timeout: Duration,
}

impl FfmpegVideoDecoder {
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, probe: Duration, frame: Duration) -> Self {
        self.probe_timeout = probe;
        self.frame_timeout = frame;
        self
    }

    fn probe(&self, runtime: &BlockingRuntime, path: &Path) -> Result<VideoMeta, MediaError> {
        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path);

        let output = runtime
            .block_on(run_piped(&mut cmd, None, self.probe_timeout))
            .map_err(|e| MediaError::Decode(format!("ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(MediaError::Decode(format!(
                "ffprobe failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_probe(&output.stdout)
    }

    fn spawn_ffmpeg(&self, path: &Path) -> Result<Child, ProcessError> {
        Command::new(&self.ffmpeg_bin)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "gray", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.ffmpeg_bin.clone(),
                source,
            })
    }
}

impl Default for FfmpegVideoDecoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, MediaError> {
        if !path.exists() {
            return Err(MediaError::Decode(format!(
                "video file not found: {}",
                path.display()
            )));
        }

        let runtime = BlockingRuntime::acquire().map_err(|e| MediaError::Decode(e.to_string()))?;
        let meta = self.probe(&runtime, path)?;
        tracing::debug!(
            path = %path.display(),
            width = meta.width,
            height = meta.height,
            total_frames = meta.total_frames,
            "Opened video stream",
        );

        // Pipes register with the reactor, so spawn inside the runtime.
        let mut child = runtime
            .block_on(async { self.spawn_ffmpeg(path) })
            .map_err(|e| MediaError::Decode(e.to_string()))?;

        let Some(stdout) = child.stdout.take() else {
            return Err(MediaError::Decode("ffmpeg stdout was not captured".into()));
        };

        Ok(Box::new(FfmpegFrames {
            child,
            stdout,
            meta,
            frame_timeout: self.frame_timeout,
            finished: false,
            runtime,
        }))
    }
}

/// Raw grayscale frames streamed from an `ffmpeg` child process.
///
/// The child is spawned with `kill_on_drop`, so dropping the source stops
/// it. `runtime` is declared last so the child and its pipe drop first.
struct FfmpegFrames {
    child: Child,
    stdout: ChildStdout,
    meta: VideoMeta,
    frame_timeout: Duration,
    finished: bool,
    runtime: BlockingRuntime,
}

impl FfmpegFrames {
    fn timed_out(&mut self, what: &str) -> MediaError {
        self.finished = true;
        let _ = self.child.start_kill();
        MediaError::Decode(format!(
            "ffmpeg {what} timed out after {}ms",
            self.frame_timeout.as_millis()
        ))
    }
}

impl FrameSource for FfmpegFrames {
    fn total_frames(&self) -> u64 {
        self.meta.total_frames
    }

    fn next_frame(&mut self) -> Result<Option<GrayImage>, MediaError> {
        if self.finished {
            return Ok(None);
        }

        let frame_len = self.meta.width as usize * self.meta.height as usize;
        let mut buf = vec![0u8; frame_len];
        let read = self
            .runtime
            .block_on_timeout(self.frame_timeout, read_full(&mut self.stdout, &mut buf));
        let filled = match read {
            Ok(filled) => filled?,
            Err(_) => return Err(self.timed_out("frame read")),
        };

        if filled == 0 {
            self.finished = true;
            let status = match self
                .runtime
                .block_on_timeout(self.frame_timeout, self.child.wait())
            {
                Ok(status) => status?,
                Err(_) => return Err(self.timed_out("exit")),
            };
            if !status.success() {
                return Err(MediaError::Decode(format!("ffmpeg exited with {status}")));
            }
            return Ok(None);
        }
        if filled < frame_len {
            self.finished = true;
            return Err(MediaError::Decode(format!(
                "truncated frame: got {filled} of {frame_len} bytes"
            )));
        }

        GrayImage::from_raw(self.meta.width, self.meta.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::Decode("frame buffer has the wrong size".into()))
    }
}

/// Read until `buf` is full or the stream ends. Returns bytes read.
async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<usize, MediaError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use image::{ImageFormat, Luma};

    use super::*;

    fn png_bytes(image: &GrayImage) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    // -- ImageCrateCodec ------------------------------------------------------

    #[test]
    fn decodes_png_to_gray() {
        let img = GrayImage::from_fn(8, 4, |x, _| Luma([(x * 30) as u8]));
        let decoded = ImageCrateCodec::default().decode_gray(&png_bytes(&img)).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert_matches!(
            ImageCrateCodec::default().decode_gray(b"definitely not an image"),
            Err(MediaError::Decode(_))
        );
    }

    #[test]
    fn encodes_jpeg() {
        let img = GrayImage::from_pixel(16, 16, Luma([128]));
        let jpeg = ImageCrateCodec::default().encode_jpeg(&img).unwrap();
        // JPEG SOI marker.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    // -- ffprobe parsing ------------------------------------------------------

    #[test]
    fn probe_uses_nb_frames() {
        let json = br#"{"streams":[{"width":640,"height":480,"nb_frames":"120","r_frame_rate":"30/1"}]}"#;
        assert_eq!(
            parse_probe(json).unwrap(),
            VideoMeta {
                width: 640,
                height: 480,
                total_frames: 120
            }
        );
    }

    #[test]
    fn probe_estimates_frames_from_duration() {
        let json = br#"{"streams":[{"width":320,"height":240,"duration":"2.0","r_frame_rate":"25/1"}]}"#;
        assert_eq!(parse_probe(json).unwrap().total_frames, 50);
    }

    #[test]
    fn probe_unknown_frame_count_is_zero() {
        let json = br#"{"streams":[{"width":320,"height":240}]}"#;
        assert_eq!(parse_probe(json).unwrap().total_frames, 0);
    }

    #[test]
    fn probe_without_video_stream_fails() {
        assert_matches!(parse_probe(br#"{"streams":[]}"#), Err(MediaError::Decode(_)));
        assert_matches!(parse_probe(b"not json"), Err(MediaError::Decode(_)));
    }

    #[test]
    fn frame_rate_parsing() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("1/0"), None);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
    }

    #[tokio::test]
    async fn read_full_reports_short_reads() {
        let mut reader = std::io::Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 5];
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 3);
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 0);
    }

    #[test]
    fn missing_video_file_fails_before_spawning() {
        let decoder = FfmpegVideoDecoder::default();
        let err = decoder.open(Path::new("/definitely/not/here.mp4")).err();
        assert_matches!(err, Some(MediaError::Decode(msg)) if msg.contains("not found"));
    }

    // -- FfmpegVideoDecoder with stand-in tools -------------------------------

    /// Write an executable shell script into `dir`.
    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    const PROBE_2X2: &str =
        r#"echo '{"streams":[{"width":2,"height":2,"nb_frames":"2"}]}'"#;

    #[cfg(unix)]
    #[test]
    fn streams_frames_from_ffmpeg_output() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"stub").unwrap();

        let ffprobe = script(dir.path(), "ffprobe", PROBE_2X2);
        let ffmpeg = script(dir.path(), "ffmpeg", "printf 'abcdefgh'");
        let decoder = FfmpegVideoDecoder::new(ffmpeg, ffprobe);

        let mut frames = decoder.open(&video).unwrap();
        assert_eq!(frames.total_frames(), 2);
        assert_eq!(frames.next_frame().unwrap().unwrap().into_raw(), b"abcd");
        assert_eq!(frames.next_frame().unwrap().unwrap().into_raw(), b"efgh");
        assert!(frames.next_frame().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn stalled_ffmpeg_times_out_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"stub").unwrap();

        let ffprobe = script(dir.path(), "ffprobe", PROBE_2X2);
        let ffmpeg = script(dir.path(), "ffmpeg", "exec sleep 5");
        let decoder = FfmpegVideoDecoder::new(ffmpeg, ffprobe)
            .with_timeouts(Duration::from_secs(5), Duration::from_millis(200));

        let mut frames = decoder.open(&video).unwrap();
        let started = std::time::Instant::now();
        let err = frames.next_frame().unwrap_err();
        assert_matches!(err, MediaError::Decode(msg) if msg.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(frames.next_frame().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn hung_ffprobe_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"stub").unwrap();

        let ffprobe = script(dir.path(), "ffprobe", "exec sleep 5");
        let decoder = FfmpegVideoDecoder::new("ffmpeg", ffprobe)
            .with_timeouts(Duration::from_millis(200), DEFAULT_FRAME_TIMEOUT);

        let err = decoder.open(&video).err();
        assert_matches!(err, Some(MediaError::Decode(msg)) if msg.contains("timed out"));
    }
}
