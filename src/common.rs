//! Common types, utilities, and error handling for the frame selection library.
//!
//! This module provides the foundational types used throughout the codebase,
//! including frame timecodes, selection candidates, and the crate error type.

use std::path::PathBuf;
use tracing::{instrument, trace};

/// Slack added before flooring `seconds * fps`, so window bounds such as
/// `0.3 * 10.0 = 2.9999999999999996` land on the intended frame.
const FRAME_ROUNDING_EPSILON: f64 = 1e-9;

/// Represents a specific point in time within a video
///
/// This type encapsulates both the frame number and framerate information,
/// allowing for precise temporal calculations and conversions.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimecode {
    frame_number: u32,
    fps: f64,
}

impl FrameTimecode {
    /// Create a new FrameTimecode
    ///
    /// # Arguments
    /// * `frame_number` - The frame number (0-indexed)
    /// * `fps` - Frames per second of the video
    ///
    /// # Panics
    /// Panics if fps is not positive (fail-fast approach)
    pub fn new(frame_number: u32, fps: f64) -> Self {
        assert!(fps > 0.0, "FPS must be positive, got: {}", fps);
        Self { frame_number, fps }
    }

    /// Timecode of the frame displayed at `seconds`, i.e. `floor(seconds * fps)`
    ///
    /// Negative times clamp to frame 0.
    pub fn from_seconds(seconds: f64, fps: f64) -> Self {
        let frame = (seconds * fps + FRAME_ROUNDING_EPSILON).floor().max(0.0);
        Self::new(frame as u32, fps)
    }

    /// Get the frame number
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Get the framerate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Convert to seconds since start of video
    pub fn seconds(&self) -> f64 {
        self.frame_number as f64 / self.fps
    }

    /// Convert to milliseconds since start of video
    pub fn milliseconds(&self) -> f64 {
        self.seconds() * 1000.0
    }
}

/// The three per-frame scores that feed the selection
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameMetrics {
    /// Variance of the Laplacian over the grayscale frame
    pub sharpness: f64,
    /// Fraction of pixels in the red hue bands, `0.0..=1.0`
    pub redness: f64,
    /// Shannon entropy (bits) of the grayscale histogram, `0.0..=8.0`
    pub entropy: f64,
}

/// A frame provisionally selected for output, carrying its metrics
///
/// Stage 1 creates candidates with sharpness only; enrichment fills in
/// redness and entropy exactly once. Fallback candidates are created with
/// all three metrics by stage 2.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub timecode: FrameTimecode,
    pub sharpness: f64,
    pub redness: f64,
    pub entropy: f64,
    pub is_fallback: bool,
}

impl Candidate {
    /// Stage-1 candidate: sharpness known, the other metrics pending
    #[instrument(level = "trace")]
    pub fn from_sharpness(frame_index: u32, sharpness: f64, fps: f64) -> Self {
        trace!("Candidate frame {} with sharpness {:.2}", frame_index, sharpness);
        Self {
            timecode: FrameTimecode::new(frame_index, fps),
            sharpness,
            redness: 0.0,
            entropy: 0.0,
            is_fallback: false,
        }
    }

    /// Synthetic mid-group candidate with freshly computed metrics
    pub fn fallback(frame_index: u32, fps: f64, metrics: FrameMetrics) -> Self {
        Self {
            timecode: FrameTimecode::new(frame_index, fps),
            sharpness: metrics.sharpness,
            redness: metrics.redness,
            entropy: metrics.entropy,
            is_fallback: true,
        }
    }

    pub fn frame_index(&self) -> u32 {
        self.timecode.frame_number()
    }

    pub fn time_sec(&self) -> f64 {
        self.timecode.seconds()
    }

    /// Store redness and entropy computed during enrichment
    pub fn set_color_metrics(&mut self, redness: f64, entropy: f64) {
        self.redness = redness;
        self.entropy = entropy;
    }

    pub fn metrics(&self) -> FrameMetrics {
        FrameMetrics {
            sharpness: self.sharpness,
            redness: self.redness,
            entropy: self.entropy,
        }
    }
}

/// All possible errors from the frame selection system
///
/// Covers video I/O issues, invalid tunables, the two empty-result
/// conditions of the pipeline, and persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum FrameSelectError {
    #[error("Failed to open video file: {path}")]
    VideoOpenFailed { path: String },

    #[error("Video file not found: {path}")]
    VideoNotFound { path: String },

    #[error("Invalid video format or corrupted file: {path}")]
    InvalidVideoFormat { path: String },

    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Frame processing failed at frame {frame}: {reason}")]
    FrameProcessingFailed { frame: u32, reason: String },

    #[error("Video contains no frames or has zero duration: {path}")]
    EmptyVideo { path: String },

    #[error("No candidate frames could be extracted from the video")]
    NoCandidates,

    #[error("No final frames were selected")]
    NoSelection,

    #[error("Failed to write image: {path}")]
    ImageWriteFailed { path: PathBuf },
}

impl FrameSelectError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a frame processing error
    pub fn frame_error(frame: u32, reason: impl Into<String>) -> Self {
        Self::FrameProcessingFailed {
            frame,
            reason: reason.into()
        }
    }
}

/// Convenient Result type for frame selection operations
pub type Result<T> = std::result::Result<T, FrameSelectError>;
