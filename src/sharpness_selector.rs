//! Stage 1: windowed sharpness selection with adaptive sampling
//!
//! Overlapping windows slide over the timeline. Inside each window frames are
//! sampled every `step` frames and scored by sharpness only; the window keeps
//! either every sample above a dynamic percentile threshold or its top-N
//! sharpest samples. The sampling step carries over from window to window and
//! adapts to how much sharpness varied in the window just processed.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use tracing::{debug, info, instrument, trace};

use crate::common::{Candidate, FrameSelectError, FrameTimecode, Result};
use crate::config::ExtractionConfig;
use crate::metrics;
use crate::video_stream::{decode_or_skip, FrameSource};

/// Variance above this fraction of the window's best sharpness halves the step
const DENSIFY_RATIO: f64 = 0.5;
/// Variance below this fraction of the window's best sharpness doubles the step
const SPARSIFY_RATIO: f64 = 0.1;

/// Frame range `[start_frame, end_frame)` covered by one stage-1 window
#[derive(Debug, Clone, PartialEq)]
pub struct FrameWindow {
    pub start_sec: f64,
    pub start_frame: u32,
    pub end_frame: u32,
}

/// Start times of the stage-1 windows
///
/// One window at 0 when the video fits in a single window, otherwise
/// `ceil((duration - window) / stride) + 1` windows spaced `stride` apart.
pub fn window_starts(duration: f64, window: f64, stride: f64) -> Vec<f64> {
    if duration <= window {
        return vec![0.0];
    }
    let count = ((duration - window) / stride).ceil() as usize + 1;
    (0..count).map(|i| i as f64 * stride).collect()
}

/// Frame ranges of every stage-1 window for a timeline
pub fn plan_windows(fps: f64, total_frames: u32, config: &ExtractionConfig) -> Vec<FrameWindow> {
    let duration = total_frames as f64 / fps;
    window_starts(duration, config.stage1_dur, config.effective_stride())
        .into_iter()
        .map(|start_sec| {
            let start_frame = FrameTimecode::from_seconds(start_sec, fps).frame_number();
            let end_frame = FrameTimecode::from_seconds(start_sec + config.stage1_dur, fps)
                .frame_number()
                .min(total_frames);
            FrameWindow { start_sec, start_frame, end_frame }
        })
        .collect()
}

/// Percentile with linear interpolation between closest ranks
///
/// `q` is in `[0, 100]`. Returns `None` for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

#[derive(Debug, Clone, Copy)]
struct Ranked {
    sharpness: f64,
    frame: u32,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sharpness
            .total_cmp(&other.sharpness)
            .then(self.frame.cmp(&other.frame))
    }
}

/// Bounded min-heap keeping the `capacity` sharpest frames offered
///
/// The minimum is replaced only by a strictly sharper frame, so among equal
/// sharpness values the first offered frame stays.
#[derive(Debug)]
pub struct TopN {
    capacity: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
}

impl TopN {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn offer(&mut self, frame: u32, sharpness: f64) {
        let entry = Ranked { sharpness, frame };
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(entry));
        } else if let Some(mut weakest) = self.heap.peek_mut() {
            if sharpness > weakest.0.sharpness {
                *weakest = Reverse(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Kept `(frame, sharpness)` pairs in frame order
    pub fn into_sorted_by_frame(self) -> Vec<(u32, f64)> {
        let mut kept: Vec<(u32, f64)> = self
            .heap
            .into_iter()
            .map(|Reverse(r)| (r.frame, r.sharpness))
            .collect();
        kept.sort_by_key(|&(frame, _)| frame);
        kept
    }
}

/// Sampling step carried from one window to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleStep(u32);

impl SampleStep {
    pub fn new(step: u32) -> Self {
        Self(step.max(1))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Step for the next window given this window's sharpness samples
    ///
    /// High variance relative to the best sample halves the step (never below
    /// 1), low variance doubles it. An empty window leaves it unchanged.
    pub fn adapt(self, samples: &[f64]) -> Self {
        if samples.is_empty() {
            return self;
        }
        let best = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = population_variance(samples);

        if variance > DENSIFY_RATIO * best {
            Self((self.0 / 2).max(1))
        } else if variance < SPARSIFY_RATIO * best {
            Self(self.0.saturating_mul(2))
        } else {
            self
        }
    }
}

fn population_variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Choose the window's candidates from its `(frame, sharpness)` samples
///
/// With a percentile fraction `p` every sample at or above the
/// `100 * (1 - p)` percentile is kept, falling back to the top-N heap if that
/// leaves nothing. Without one the top-N heap is used directly.
pub fn pick_window_candidates(
    samples: &[(u32, f64)],
    top_n: usize,
    sharp_percentile: Option<f64>,
) -> Vec<(u32, f64)> {
    let mut top = TopN::new(top_n);
    for &(frame, sharpness) in samples {
        top.offer(frame, sharpness);
    }

    if let Some(p) = sharp_percentile {
        let values: Vec<f64> = samples.iter().map(|&(_, s)| s).collect();
        if let Some(threshold) = percentile(&values, 100.0 * (1.0 - p)) {
            let above: Vec<(u32, f64)> = samples
                .iter()
                .copied()
                .filter(|&(_, s)| s >= threshold)
                .collect();
            if !above.is_empty() {
                trace!("Percentile threshold {:.2} kept {} samples", threshold, above.len());
                return above;
            }
            debug!("Percentile threshold {:.2} kept nothing, using top-{} heap", threshold, top_n);
        }
    }

    top.into_sorted_by_frame()
}

/// Run stage 1 over a frame source
///
/// Frames that fail to decode are skipped. Candidates carry sharpness only.
///
/// # Errors
/// * `NoCandidates` - If no window produced a single decodable sample
#[instrument(skip(source, config))]
pub fn select_candidates<S: FrameSource + ?Sized>(
    source: &mut S,
    config: &ExtractionConfig,
) -> Result<Vec<Candidate>> {
    let fps = source.fps();
    let total_frames = source.frame_count();
    select_candidates_with(fps, total_frames, config, |index| {
        match decode_or_skip(source, index) {
            Some(frame) => metrics::sharpness(&frame).map(Some),
            None => Ok(None),
        }
    })
}

/// Stage 1 over any sharpness probe
///
/// `probe(index)` returns the sharpness of a frame, or `None` when the frame
/// cannot be decoded.
pub fn select_candidates_with<P>(
    fps: f64,
    total_frames: u32,
    config: &ExtractionConfig,
    mut probe: P,
) -> Result<Vec<Candidate>>
where
    P: FnMut(u32) -> Result<Option<f64>>,
{
    let windows = plan_windows(fps, total_frames, config);
    let percentile = config.percentile_enabled().then_some(config.sharp_percentile);

    info!("Stage 1: sharpness selection over {} windows (stride {:.3}s)",
          windows.len(), config.effective_stride());

    let mut step = SampleStep::new(config.sample_step);
    let mut emitted = HashSet::new();
    let mut candidates = Vec::new();

    for window in &windows {
        let mut samples = Vec::new();
        for index in (window.start_frame..window.end_frame).step_by(step.get() as usize) {
            if let Some(sharpness) = probe(index)? {
                trace!("Frame {} sharpness {:.2}", index, sharpness);
                samples.push((index, sharpness));
            }
        }

        if samples.is_empty() {
            debug!("Window at {:.2}s had no decodable samples", window.start_sec);
            continue;
        }

        let picked = pick_window_candidates(&samples, config.top_n, percentile);
        debug!("Window at {:.2}s: {} samples at step {}, {} picked",
               window.start_sec, samples.len(), step.get(), picked.len());

        for (frame, sharpness) in picked {
            if emitted.insert(frame) {
                candidates.push(Candidate::from_sharpness(frame, sharpness, fps));
            } else {
                trace!("Frame {} already emitted by an earlier window", frame);
            }
        }

        let values: Vec<f64> = samples.iter().map(|&(_, s)| s).collect();
        let next = step.adapt(&values);
        if next != step {
            debug!("Sample step {} -> {}", step.get(), next.get());
        }
        step = next;
    }

    if candidates.is_empty() {
        return Err(FrameSelectError::NoCandidates);
    }

    info!("Stage 1 kept {} candidates", candidates.len());
    Ok(candidates)
}
