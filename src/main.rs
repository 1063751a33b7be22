//! Command-line interface for the frame selection library
//!
//! `extract` writes the selected frames of one video, `validate` scores the
//! selection of several videos against annotated frame indices, and `info`
//! prints the container properties of a video.

use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};

use framesift::{
    extract, get_video_info, init_tracing, validate_batch, ExtractionConfig, ExtractionReport,
    ScoreWeights, ValidationTally,
};

/// Default stage-2 group length for `extract`
const EXTRACT_STAGE2_DUR: f64 = 5.0;
/// Default stage-2 group length for `validate`
const VALIDATE_STAGE2_DUR: f64 = 4.0;

#[derive(Parser, Debug)]
#[command(name = "framesift")]
#[command(about = "Extract in-focus, salient frames from procedure videos, prioritising sharpness")]
#[command(version)]
struct Cli {
    /// Enable debug logging and tracing
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Simple, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract useful frames from a video with the two-stage method
    Extract {
        /// Path of the video file
        video: String,

        /// Output directory; each run gets its own timestamped subdirectory
        #[arg(long, default_value = "frames_selected")]
        output: PathBuf,

        #[command(flatten)]
        tunables: Tunables,
    },

    /// Measure precision and recall of extraction against ground truth
    Validate {
        /// Paths of the videos to validate
        #[arg(required = true)]
        videos: Vec<String>,

        /// Directory holding one `<video-stem>.txt` of frame indices per video
        #[arg(long)]
        gt_dir: PathBuf,

        /// Directory for the extracted predictions
        #[arg(long, default_value = "val_frames")]
        output: PathBuf,

        #[command(flatten)]
        tunables: Tunables,
    },

    /// Show video information only
    Info {
        /// Path of the video file
        video: String,
    },
}

#[derive(Args, Debug, Clone)]
struct Tunables {
    /// Stage-1 window length in seconds (sharpness)
    #[arg(long, default_value_t = 1.0)]
    stage1_dur: f64,

    /// Stage-2 group length in seconds (combined score) [default: 5 for extract, 4 for validate]
    #[arg(long)]
    stage2_dur: Option<f64>,

    /// Sample every N frames in stage 1 (adapted per window)
    #[arg(long, default_value_t = 1)]
    sample_step: u32,

    /// Weight of sharpness in the stage-2 score
    #[arg(long, default_value_t = 1.0)]
    w_sharp: f64,

    /// Weight of redness in the stage-2 score
    #[arg(long, default_value_t = 100.0)]
    w_red: f64,

    /// Weight of entropy in the stage-2 score
    #[arg(long, default_value_t = 1.0)]
    w_entropy: f64,

    /// Sharpness percentile for the dynamic stage-1 threshold (0-1, outside disables)
    #[arg(long, default_value_t = 0.1, allow_negative_numbers = true)]
    sharp_percentile: f64,

    /// Number of top-N frames per stage-1 window
    #[arg(long, default_value_t = 1)]
    top_n: usize,

    /// Stride in seconds between stage-1 windows [default: stage1-dur]
    #[arg(long, allow_negative_numbers = true)]
    stage1_stride: Option<f64>,
}

impl Tunables {
    fn into_config(self, default_stage2_dur: f64) -> ExtractionConfig {
        ExtractionConfig {
            stage1_dur: self.stage1_dur,
            stage1_stride: self.stage1_stride,
            sample_step: self.sample_step,
            sharp_percentile: self.sharp_percentile,
            top_n: self.top_n,
            stage2_dur: self.stage2_dur.unwrap_or(default_stage2_dur),
            weights: ScoreWeights {
                sharpness: self.w_sharp,
                redness: self.w_red,
                entropy: self.w_entropy,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One line per saved frame
    Simple,
    /// Per-frame metrics and timing
    Detailed,
    /// JSON document for integration
    Json,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    init_tracing(log_level);

    info!("framesift CLI v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", cli);

    match cli.command {
        Command::Extract { video, output, tunables } => {
            let config = tunables.into_config(EXTRACT_STAGE2_DUR);
            debug!("Configuration: {:?}", config);

            let start_time = Instant::now();
            let report = extract(&video, &output, &config)
                .with_context(|| format!("Frame extraction failed for {}", video))?;
            output_extraction(&report, &config, cli.format, start_time.elapsed())
        }
        Command::Validate { videos, gt_dir, output, tunables } => {
            let config = tunables.into_config(VALIDATE_STAGE2_DUR);
            debug!("Configuration: {:?}", config);

            let start_time = Instant::now();
            let tally = validate_batch(&videos, &gt_dir, &output, &config)
                .context("Validation failed")?;
            output_validation(&tally, &config, cli.format, start_time.elapsed())
        }
        Command::Info { video } => show_video_info(&video),
    }
}

fn show_video_info(video_path: &str) -> Result<()> {
    info!("Analyzing video: {}", video_path);

    let video_info = get_video_info(video_path)
        .with_context(|| format!("Failed to get video info for {}", video_path))?;

    println!("Video Information:");
    println!("  Path: {}", video_info.path);
    println!("  Dimensions: {}x{}", video_info.width, video_info.height);
    println!("  Frame Rate: {:.2} fps", video_info.fps);
    println!("  Frame Count: {}", video_info.frame_count);
    println!("  Duration: {:.2} seconds", video_info.duration_seconds);
    println!("  Description: {}", video_info.description());

    if !video_info.is_valid() {
        warn!("Video properties appear invalid - extraction will fail");
    }

    Ok(())
}

fn config_json(config: &ExtractionConfig) -> serde_json::Value {
    serde_json::json!({
        "stage1_dur": config.stage1_dur,
        "stage1_stride": config.effective_stride(),
        "stage2_dur": config.stage2_dur,
        "sample_step": config.sample_step,
        "sharp_percentile": config.sharp_percentile,
        "top_n": config.top_n,
        "w_sharp": config.weights.sharpness,
        "w_red": config.weights.redness,
        "w_entropy": config.weights.entropy,
    })
}

fn output_extraction(
    report: &ExtractionReport,
    config: &ExtractionConfig,
    format: OutputFormat,
    elapsed: Duration,
) -> Result<()> {
    match format {
        OutputFormat::Simple => {
            for path in &report.written {
                println!("Saved: {}", path.display());
            }
        }
        OutputFormat::Detailed => {
            println!("Frame Selection Results:");
            println!("  Video: {}", report.video.description());
            println!("  Output directory: {}", report.run_dir.display());
            println!("  Extraction time: {}ms", elapsed.as_millis());
            println!("  Stage-1 candidates: {}", report.selection.stage1_candidates);
            println!("  Frames selected: {}", report.selection.frames.len());
            for (i, frame) in report.selection.frames.iter().enumerate() {
                println!(
                    "    {}: frame {} at {:.2}s sharp={:.1} red={:.3} entropy={:.3}{}",
                    i + 1,
                    frame.frame_index(),
                    frame.time_sec(),
                    frame.sharpness,
                    frame.redness,
                    frame.entropy,
                    if frame.is_fallback { " (fallback)" } else { "" },
                );
            }
        }
        OutputFormat::Json => {
            let frames: Vec<serde_json::Value> = report
                .selection
                .frames
                .iter()
                .map(|frame| {
                    serde_json::json!({
                        "frame_index": frame.frame_index(),
                        "time_sec": frame.time_sec(),
                        "sharpness": frame.sharpness,
                        "redness": frame.redness,
                        "entropy": frame.entropy,
                        "is_fallback": frame.is_fallback,
                    })
                })
                .collect();
            let written: Vec<String> = report
                .written
                .iter()
                .map(|path| path.display().to_string())
                .collect();

            let json_output = serde_json::json!({
                "video_path": report.video.path,
                "fps": report.video.fps,
                "frame_count": report.video.frame_count,
                "output_dir": report.run_dir.display().to_string(),
                "extraction_time_ms": elapsed.as_millis(),
                "stage1_candidates": report.selection.stage1_candidates,
                "frames": frames,
                "written": written,
                "config": config_json(config),
            });

            println!("{}", serde_json::to_string_pretty(&json_output)
                .context("JSON serialization failed")?);
        }
    }

    info!("Extraction completed in {}ms, wrote {} frames",
          elapsed.as_millis(), report.written.len());

    Ok(())
}

fn output_validation(
    tally: &ValidationTally,
    config: &ExtractionConfig,
    format: OutputFormat,
    elapsed: Duration,
) -> Result<()> {
    match format {
        OutputFormat::Simple => println!("{}", tally),
        OutputFormat::Detailed => {
            println!("{}", tally);
            println!("  Videos scored: {}", tally.videos);
            println!("  True positives: {}", tally.true_positives);
            println!("  Predicted frames: {}", tally.total_predicted);
            println!("  Annotated frames: {}", tally.total_ground_truth);
            println!("  Validation time: {}ms", elapsed.as_millis());
        }
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "precision": tally.precision(),
                "recall": tally.recall(),
                "videos": tally.videos,
                "true_positives": tally.true_positives,
                "total_predicted": tally.total_predicted,
                "total_ground_truth": tally.total_ground_truth,
                "validation_time_ms": elapsed.as_millis(),
                "config": config_json(config),
            });
            println!("{}", serde_json::to_string_pretty(&json_output)
                .context("JSON serialization failed")?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_extract_defaults() {
        let cli = Cli::try_parse_from(["framesift", "extract", "video.mp4"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Simple);
        assert!(!cli.verbose);

        let Command::Extract { video, output, tunables } = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(video, "video.mp4");
        assert_eq!(output, PathBuf::from("frames_selected"));

        let config = tunables.into_config(EXTRACT_STAGE2_DUR);
        assert_eq!(config.stage2_dur, 5.0);
        assert_eq!(config.stage1_dur, 1.0);
        assert_eq!(config.stage1_stride, None);
        assert_eq!(config.weights, ScoreWeights::default());
        assert_eq!(config.top_n, 1);
        assert_eq!(config.sharp_percentile, 0.1);
    }

    #[test]
    fn test_extract_tunables() {
        let cli = Cli::try_parse_from([
            "framesift", "extract", "video.mp4",
            "--output", "out",
            "--top-n", "2",
            "--stage1-stride", "0.5",
            "--stage2-dur", "3",
            "--sample-step", "4",
            "--w-red", "50",
            "--sharp-percentile", "0",
            "--format", "json",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);

        let Command::Extract { tunables, .. } = cli.command else {
            panic!("expected extract");
        };
        let config = tunables.into_config(EXTRACT_STAGE2_DUR);
        assert_eq!(config.top_n, 2);
        assert_eq!(config.stage1_stride, Some(0.5));
        assert_eq!(config.stage2_dur, 3.0);
        assert_eq!(config.sample_step, 4);
        assert_eq!(config.weights.redness, 50.0);
        assert!(!config.percentile_enabled());
    }

    #[test]
    fn test_validate_arguments() {
        let cli = Cli::try_parse_from([
            "framesift", "validate", "a.mp4", "b.mp4", "--gt-dir", "annotations",
        ])
        .unwrap();

        let Command::Validate { videos, gt_dir, output, tunables } = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(videos, vec!["a.mp4", "b.mp4"]);
        assert_eq!(gt_dir, PathBuf::from("annotations"));
        assert_eq!(output, PathBuf::from("val_frames"));
        assert_eq!(tunables.into_config(VALIDATE_STAGE2_DUR).stage2_dur, 4.0);
    }

    #[test]
    fn test_validate_requires_ground_truth_dir_and_videos() {
        assert!(Cli::try_parse_from(["framesift", "validate", "a.mp4"]).is_err());
        assert!(Cli::try_parse_from(["framesift", "validate", "--gt-dir", "gt"]).is_err());
    }
}
