//! Two-stage keyframe selection for long procedure recordings
//!
//! This crate picks a small set of frames from a video that are both in focus
//! and visually salient. Stage 1 slides short, possibly overlapping windows
//! over the timeline and keeps the locally sharpest frames (adaptive sampling,
//! dynamic percentile threshold). Stage 2 cuts the surviving candidates into
//! longer groups and keeps one frame per group by a weighted score of
//! sharpness, redness and entropy, falling back to the group's midpoint frame
//! when stage 1 left a group empty.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use framesift::{extract, ExtractionConfig};
//!
//! let config = ExtractionConfig { top_n: 2, stage1_stride: Some(0.5), ..Default::default() };
//! let report = extract("procedure.mp4", Path::new("frames_selected"), &config)?;
//! for frame in &report.written {
//!     println!("{}", frame.display());
//! }
//! # Ok::<(), framesift::FrameSelectError>(())
//! ```

mod common;
mod config;
mod enrichment;
pub mod metrics;
mod output;
mod score_selector;
mod sharpness_selector;
mod validation;
mod video_stream;

#[cfg(test)]
mod test_support;

// Re-export main types for public API
pub use common::{Candidate, FrameMetrics, FrameSelectError, FrameTimecode, Result};
pub use config::{ExtractionConfig, ScoreWeights};
pub use enrichment::enrich_candidates;
pub use output::{
    collect_predicted_indices, create_run_directory, frame_file_name, parse_frame_index,
    run_directory_name, video_stem, write_selection,
};
pub use score_selector::{best_candidate, group_count, select_final, select_final_with};
pub use sharpness_selector::{
    percentile, pick_window_candidates, plan_windows, select_candidates, select_candidates_with,
    window_starts, FrameWindow, SampleStep, TopN,
};
pub use validation::{
    ground_truth_path, load_ground_truth, parse_ground_truth, ValidationTally,
};
pub use video_stream::{FrameSource, VideoStream, DEFAULT_FPS};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{instrument, info, debug, warn};

/// Outcome of the in-memory part of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Number of stage-1 candidates that went into stage 2
    pub stage1_candidates: usize,
    /// Final frames, one at most per stage-2 group, in group order
    pub frames: Vec<Candidate>,
}

/// Everything one `extract` run produced
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub video: VideoInfo,
    pub run_dir: PathBuf,
    pub selection: Selection,
    pub written: Vec<PathBuf>,
}

/// Run stage 1, enrichment and stage 2 over a frame source
///
/// Nothing is written; the returned frames are what `extract` would persist.
///
/// # Errors
/// * `NoCandidates` - If stage 1 found no decodable frame
/// * `NoSelection` - If stage 2 produced no frame
#[instrument(skip(source, config))]
pub fn select_frames<S: FrameSource + ?Sized>(
    source: &mut S,
    config: &ExtractionConfig,
) -> Result<Selection> {
    config.validate()?;

    let mut candidates = select_candidates(source, config)?;
    enrich_candidates(source, &mut candidates)?;
    let frames = select_final(source, &candidates, config)?;

    Ok(Selection {
        stage1_candidates: candidates.len(),
        frames,
    })
}

/// Select frames from a video file and write them as PNGs
///
/// Frames land in a new `<stem>_<timestamp>` directory under `output_dir`,
/// which is only created once there is something to write.
///
/// # Errors
/// * `InvalidConfig` - If the tunables are unusable
/// * `VideoNotFound` / `VideoOpenFailed` / `EmptyVideo` - If the video can't be used
/// * `NoCandidates` / `NoSelection` - If a stage produced nothing
#[instrument(skip(config))]
pub fn extract(video_path: &str, output_dir: &Path, config: &ExtractionConfig) -> Result<ExtractionReport> {
    config.validate()?;

    let mut stream = VideoStream::open(video_path)?;
    let video = VideoInfo::from_stream(&stream);
    if !video.is_valid() {
        return Err(FrameSelectError::EmptyVideo { path: video_path.to_string() });
    }
    info!("Video properties: {}", video.description());

    let selection = select_frames(&mut stream, config)?;

    let run_dir = create_run_directory(output_dir, Path::new(video_path))?;
    let written = write_selection(&mut stream, &run_dir, &selection.frames)?;

    info!("Extraction completed. Wrote {} of {} selected frames to {}",
          written.len(), selection.frames.len(), run_dir.display());

    Ok(ExtractionReport {
        video,
        run_dir,
        selection,
        written,
    })
}

/// Extract every video and score the written frames against ground truth
///
/// Each video is extracted into `<output_dir>/<stem>/`. Its annotations are
/// read from `<gt_dir>/<stem>.txt`; a video without one is skipped with a
/// warning. A video whose extraction fails counts with no predictions.
#[instrument(skip(videos, config), fields(videos = videos.len()))]
pub fn validate_batch<P: AsRef<str>>(
    videos: &[P],
    gt_dir: &Path,
    output_dir: &Path,
    config: &ExtractionConfig,
) -> Result<ValidationTally> {
    config.validate()?;

    let mut tally = ValidationTally::default();
    for video in videos {
        let video = video.as_ref();
        let video_path = Path::new(video);
        let stem = video_stem(video_path);

        let ground_truth = match load_ground_truth(&ground_truth_path(gt_dir, video_path)) {
            Ok(Some(ground_truth)) => ground_truth,
            Ok(None) => {
                warn!("Missing ground truth for {}, skipping", stem);
                continue;
            }
            Err(e) => {
                warn!("Unreadable ground truth for {}, skipping: {}", stem, e);
                continue;
            }
        };

        let predicted = match extract(video, &output_dir.join(&stem), config)
            .and_then(|report| collect_predicted_indices(&report.run_dir))
        {
            Ok(predicted) => predicted,
            Err(e) => {
                warn!("Extraction failed for {}: {}", video, e);
                BTreeSet::new()
            }
        };

        debug!("{}: predicted {:?}", stem, predicted);
        tally.add_video(&predicted, &ground_truth);
    }

    info!("Validated {} videos: {}", tally.videos, tally);
    Ok(tally)
}

/// Get video information without performing selection
///
/// # Arguments
/// * `video_path` - Path to the video file to analyze
///
/// # Returns
/// * `Result<VideoInfo>` - Video metadata including FPS, frame count, and dimensions
#[instrument]
pub fn get_video_info(video_path: &str) -> Result<VideoInfo> {
    let video_stream = VideoStream::open(video_path)?;
    Ok(VideoInfo::from_stream(&video_stream))
}

/// Video metadata information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub fps: f64,
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl VideoInfo {
    fn from_stream(stream: &VideoStream) -> Self {
        Self {
            path: stream.path().to_string(),
            fps: stream.fps(),
            frame_count: stream.frame_count(),
            width: stream.width().max(0) as u32,
            height: stream.height().max(0) as u32,
            duration_seconds: stream.duration_seconds(),
        }
    }

    /// Get a human-readable description of the video
    pub fn description(&self) -> String {
        format!(
            "{}x{} at {:.2}fps, {} frames ({:.1}s duration)",
            self.width, self.height, self.fps, self.frame_count, self.duration_seconds
        )
    }

    /// Whether the timeline can be selected from: frames and a positive duration
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0
            && self.frame_count > 0
            && self.duration_seconds > 0.0
    }
}

/// Initialize tracing for the library
///
/// Call this once at the start of your application to enable log output.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Frame selection library initialized with tracing level: {}", level);
}
