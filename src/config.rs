//! Tunables for the two selection stages
//!
//! Defaults mirror the values the extraction tool has always shipped with.

use crate::common::{FrameSelectError, Result};

/// Weights of the stage-2 combined score
///
/// `score = sharpness * sharpness_weight + redness * redness_weight + entropy * entropy_weight`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub sharpness: f64,
    pub redness: f64,
    pub entropy: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        // Redness is a ratio in [0, 1]; scale it into the same range as the other terms
        Self {
            sharpness: 1.0,
            redness: 100.0,
            entropy: 1.0,
        }
    }
}

impl ScoreWeights {
    /// Combined score of one set of metrics
    pub fn score(&self, sharpness: f64, redness: f64, entropy: f64) -> f64 {
        self.sharpness * sharpness + self.redness * redness + self.entropy * entropy
    }

    fn validate(&self) -> Result<()> {
        if !(self.sharpness.is_finite() && self.redness.is_finite() && self.entropy.is_finite()) {
            return Err(FrameSelectError::config_error(
                format!("Score weights must be finite, got {:?}", self)
            ));
        }
        Ok(())
    }
}

/// All tunables of one extraction run
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Stage-1 window length in seconds
    pub stage1_dur: f64,
    /// Distance between stage-1 window starts; `None` means `stage1_dur`
    pub stage1_stride: Option<f64>,
    /// Initial sampling step (frames) inside stage-1 windows
    pub sample_step: u32,
    /// Fraction of the sharpest samples kept per window; outside `(0, 1)` disables it
    pub sharp_percentile: f64,
    /// Size of the per-window top-N heap
    pub top_n: usize,
    /// Stage-2 group length in seconds
    pub stage2_dur: f64,
    pub weights: ScoreWeights,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            stage1_dur: 1.0,
            stage1_stride: None,
            sample_step: 1,
            sharp_percentile: 0.1,
            top_n: 1,
            stage2_dur: 4.0,
            weights: ScoreWeights::default(),
        }
    }
}

impl ExtractionConfig {
    /// Reject tunables the selectors cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.stage1_dur.is_finite() && self.stage1_dur > 0.0) {
            return Err(FrameSelectError::config_error(
                format!("stage1_dur must be positive, got {}", self.stage1_dur)
            ));
        }
        if !(self.stage2_dur.is_finite() && self.stage2_dur > 0.0) {
            return Err(FrameSelectError::config_error(
                format!("stage2_dur must be positive, got {}", self.stage2_dur)
            ));
        }
        if self.sample_step == 0 {
            return Err(FrameSelectError::config_error("sample_step must be at least 1"));
        }
        if self.top_n == 0 {
            return Err(FrameSelectError::config_error("top_n must be at least 1"));
        }
        if !self.sharp_percentile.is_finite() {
            return Err(FrameSelectError::config_error(
                format!("sharp_percentile must be finite, got {}", self.sharp_percentile)
            ));
        }
        if let Some(stride) = self.stage1_stride {
            if stride.is_nan() {
                return Err(FrameSelectError::config_error("stage1_stride must be a number"));
            }
        }
        self.weights.validate()
    }

    /// Window stride after clamping into `(0, stage1_dur]`
    ///
    /// A missing, non-positive or too-large stride becomes `stage1_dur`
    /// (non-overlapping windows).
    pub fn effective_stride(&self) -> f64 {
        match self.stage1_stride {
            Some(stride) if stride > 0.0 && stride <= self.stage1_dur => stride,
            _ => self.stage1_dur,
        }
    }

    /// Whether the dynamic percentile threshold is active
    pub fn percentile_enabled(&self) -> bool {
        self.sharp_percentile > 0.0 && self.sharp_percentile < 1.0
    }
}
