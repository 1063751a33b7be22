//! Video stream handling using OpenCV backend
//!
//! This module defines the random-access [`FrameSource`] seam the selectors
//! read from, and its OpenCV `VideoCapture` implementation. Every read seeks
//! first, so a source is exclusively borrowed by whichever step is decoding.

use opencv::{videoio, core::Mat, prelude::*};
use tracing::{instrument, debug, warn, info};
use std::path::Path;
use crate::common::{Result, FrameSelectError};

/// Framerate assumed when the container does not report one
pub const DEFAULT_FPS: f64 = 30.0;

/// A finite, randomly seekable sequence of decoded frames
pub trait FrameSource {
    /// Frames per second of the timeline
    fn fps(&self) -> f64;

    /// Total number of frames; valid indices are `0..frame_count()`
    fn frame_count(&self) -> u32;

    /// Seek to `index` and decode that frame
    ///
    /// Returns `Ok(None)` when the frame cannot be decoded. Callers treat that
    /// as a skip, never as a failure of the run.
    fn frame_at(&mut self, index: u32) -> Result<Option<Mat>>;

    /// Timeline length in seconds
    fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.fps()
    }
}

/// Decode a frame, folding decoder errors into a skip
pub(crate) fn decode_or_skip<S: FrameSource + ?Sized>(source: &mut S, index: u32) -> Option<Mat> {
    match source.frame_at(index) {
        Ok(frame) => {
            if frame.is_none() {
                debug!("Frame {} could not be decoded, skipping", index);
            }
            frame
        }
        Err(e) => {
            debug!("Frame {} decode error, skipping: {}", index, e);
            None
        }
    }
}

/// Wrapper around OpenCV VideoCapture with frame-accurate seeking
///
/// This struct provides a safe, instrumented interface to OpenCV's video
/// reading capabilities, with proper error handling and logging.
pub struct VideoStream {
    cap: videoio::VideoCapture,
    fps: f64,
    frame_count: u32,
    width: i32,
    height: i32,
    path: String,
}

impl VideoStream {
    /// Open a video file for reading
    ///
    /// # Arguments
    /// * `path` - Path to the video file
    ///
    /// # Errors
    /// * `VideoNotFound` - If the file doesn't exist
    /// * `VideoOpenFailed` - If OpenCV can't open the file
    /// * `InvalidVideoFormat` - If the container properties can't be read
    /// * `EmptyVideo` - If the video has no frames
    #[instrument]
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening video stream: {}", path);

        // Check the file first (fail-fast approach)
        if !Path::new(path).is_file() {
            return Err(FrameSelectError::VideoNotFound {
                path: path.to_string()
            });
        }

        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)
            .map_err(|e| {
                warn!("Failed to create VideoCapture: {}", e);
                FrameSelectError::VideoOpenFailed {
                    path: path.to_string()
                }
            })?;

        let is_opened = cap.is_opened().map_err(|e| {
            warn!("Failed to check if VideoCapture is opened: {}", e);
            FrameSelectError::VideoOpenFailed {
                path: path.to_string()
            }
        })?;

        if !is_opened {
            return Err(FrameSelectError::VideoOpenFailed {
                path: path.to_string()
            });
        }

        let property = |prop: i32, name: &str| -> Result<f64> {
            cap.get(prop).map_err(|e| {
                warn!("Failed to get video {}: {}", name, e);
                FrameSelectError::InvalidVideoFormat {
                    path: path.to_string()
                }
            })
        };

        let mut fps = property(videoio::CAP_PROP_FPS, "FPS")?;
        let frame_count = property(videoio::CAP_PROP_FRAME_COUNT, "frame count")?;
        let width = property(videoio::CAP_PROP_FRAME_WIDTH, "frame width")? as i32;
        let height = property(videoio::CAP_PROP_FRAME_HEIGHT, "frame height")? as i32;

        if !(fps.is_finite() && fps > 0.0) {
            warn!("Video reports fps {}, assuming {}", fps, DEFAULT_FPS);
            fps = DEFAULT_FPS;
        }

        if !(frame_count.is_finite() && frame_count >= 1.0) {
            return Err(FrameSelectError::EmptyVideo {
                path: path.to_string()
            });
        }

        info!("Video opened successfully - FPS: {}, Frames: {}, Size: {}x{}",
              fps, frame_count, width, height);

        Ok(Self {
            cap,
            fps,
            frame_count: frame_count as u32,
            width,
            height,
            path: path.to_string(),
        })
    }

    /// Get the frame width in pixels
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Get the frame height in pixels
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Get the video file path
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FrameSource for VideoStream {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u32 {
        self.frame_count
    }

    #[instrument(level = "trace", skip(self))]
    fn frame_at(&mut self, index: u32) -> Result<Option<Mat>> {
        if index >= self.frame_count {
            return Ok(None);
        }

        let positioned = self.cap.set(videoio::CAP_PROP_POS_FRAMES, index as f64)
            .map_err(|e| FrameSelectError::frame_error(index, format!("OpenCV seek failed: {}", e)))?;
        if !positioned {
            return Ok(None);
        }

        let mut frame = Mat::default();
        let success = self.cap.read(&mut frame)
            .map_err(|e| FrameSelectError::frame_error(index, format!("OpenCV read failed: {}", e)))?;

        if success && !frame.empty() {
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }
}

// Implement Debug manually to avoid showing internal OpenCV state
impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("path", &self.path)
            .field("fps", &self.fps)
            .field("frame_count", &self.frame_count)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
