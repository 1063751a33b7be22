//! Persisting selected frames
//!
//! Each run writes into a fresh `<stem>_<YYYYmmdd_HHMMSS>` directory, one PNG
//! per selected frame, with the frame index and integer metrics encoded in the
//! file name so the selection can be recovered from the directory listing.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use opencv::{core::Vector, imgcodecs};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::common::{Candidate, FrameSelectError, Result};
use crate::video_stream::{decode_or_skip, FrameSource};

pub const FRAME_EXTENSION: &str = "png";

const MAX_RUN_DIRECTORY_ATTEMPTS: u32 = 1000;

static FRAME_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^frame_(\d+)_").expect("frame file name pattern is valid"));

/// File name encoding index, whole seconds, sharpness, redness x100 and entropy
///
/// e.g. `frame_000123_t0045_sharp812_red37_entropy6.png`
pub fn frame_file_name(candidate: &Candidate) -> String {
    format!(
        "frame_{:06}_t{:04}_sharp{}_red{}_entropy{}.{}",
        candidate.frame_index(),
        candidate.time_sec() as u64,
        candidate.sharpness as u64,
        (candidate.redness * 100.0) as u64,
        candidate.entropy as u64,
        FRAME_EXTENSION,
    )
}

/// Frame index encoded at the start of an output file name
pub fn parse_frame_index(file_name: &str) -> Option<u32> {
    FRAME_FILE_NAME
        .captures(file_name)
        .and_then(|captures| captures[1].parse().ok())
}

/// Base file name of a video without its extension
pub fn video_stem(video_path: &Path) -> String {
    video_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "video".to_string())
}

pub fn run_directory_name(video_path: &Path, timestamp: DateTime<Local>) -> String {
    format!("{}_{}", video_stem(video_path), timestamp.format("%Y%m%d_%H%M%S"))
}

/// Create a new run directory under `output_root`
///
/// A numeric suffix is appended when a directory with the same timestamp
/// already exists, so a run never writes into another run's directory.
#[instrument]
pub fn create_run_directory(output_root: &Path, video_path: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_root)?;
    let base = run_directory_name(video_path, Local::now());

    for attempt in 0..MAX_RUN_DIRECTORY_ATTEMPTS {
        let name = if attempt == 0 { base.clone() } else { format!("{}_{}", base, attempt) };
        let path = output_root.join(name);
        match fs::create_dir(&path) {
            Ok(()) => {
                debug!("Created run directory {}", path.display());
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free run directory name for {} under {}", base, output_root.display()),
    )
    .into())
}

/// Re-decode and write every selected frame as a PNG into `dir`
///
/// Frames that no longer decode are skipped with a warning.
#[instrument(skip(source, selected), fields(frames = selected.len()))]
pub fn write_selection<S: FrameSource + ?Sized>(
    source: &mut S,
    dir: &Path,
    selected: &[Candidate],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(selected.len());

    for candidate in selected {
        let Some(frame) = decode_or_skip(source, candidate.frame_index()) else {
            warn!("Frame {} could not be decoded for writing, skipping", candidate.frame_index());
            continue;
        };

        let path = dir.join(frame_file_name(candidate));
        let target = path
            .to_str()
            .ok_or_else(|| FrameSelectError::ImageWriteFailed { path: path.clone() })?;
        if !imgcodecs::imwrite(target, &frame, &Vector::new())? {
            return Err(FrameSelectError::ImageWriteFailed { path });
        }

        info!("Saved: {}", path.display());
        written.push(path);
    }

    Ok(written)
}

/// Frame indices recovered from the PNG names in `dir`
pub fn collect_predicted_indices(dir: &Path) -> Result<BTreeSet<u32>> {
    let mut indices = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(FRAME_EXTENSION) {
            continue;
        }
        if let Some(index) = path.file_name().and_then(|n| n.to_str()).and_then(parse_frame_index) {
            indices.insert(index);
        }
    }
    Ok(indices)
}
