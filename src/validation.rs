//! Precision and recall of selected frames against annotated ground truth
//!
//! Counts are summed over the whole batch before dividing, so long videos
//! weigh more than short ones.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::Result;
use crate::output::video_stem;

/// Summed counts across every validated video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationTally {
    pub true_positives: usize,
    pub total_predicted: usize,
    pub total_ground_truth: usize,
    pub videos: usize,
}

impl ValidationTally {
    /// Add one video's predicted and annotated frame sets
    pub fn add_video(&mut self, predicted: &BTreeSet<u32>, ground_truth: &BTreeSet<u32>) {
        let hits = predicted.intersection(ground_truth).count();
        debug!("Video: {} predicted, {} annotated, {} matched",
               predicted.len(), ground_truth.len(), hits);
        self.true_positives += hits;
        self.total_predicted += predicted.len();
        self.total_ground_truth += ground_truth.len();
        self.videos += 1;
    }

    /// `true_positives / total_predicted`, 0.0 with no predictions
    pub fn precision(&self) -> f64 {
        if self.total_predicted == 0 {
            0.0
        } else {
            self.true_positives as f64 / self.total_predicted as f64
        }
    }

    /// `true_positives / total_ground_truth`, 0.0 with no annotations
    pub fn recall(&self) -> f64 {
        if self.total_ground_truth == 0 {
            0.0
        } else {
            self.true_positives as f64 / self.total_ground_truth as f64
        }
    }
}

impl fmt::Display for ValidationTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Precision: {:.3}, Recall: {:.3}", self.precision(), self.recall())
    }
}

/// `<gt_dir>/<video-stem>.txt`
pub fn ground_truth_path(gt_dir: &Path, video_path: &Path) -> PathBuf {
    gt_dir.join(format!("{}.txt", video_stem(video_path)))
}

/// Parse one frame index per line; blank and non-numeric lines are ignored
pub fn parse_ground_truth(contents: &str) -> BTreeSet<u32> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|line| line.parse().ok())
        .collect()
}

/// Load a ground-truth file, `None` if it does not exist
pub fn load_ground_truth(path: &Path) -> Result<Option<BTreeSet<u32>>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(parse_ground_truth(&contents))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_tally_aggregates_counts_not_ratios() {
        let mut tally = ValidationTally::default();
        tally.add_video(&set(&[1, 2, 3, 4]), &set(&[1, 2, 9]));
        tally.add_video(&set(&[10]), &set(&[10, 11, 12, 13, 14, 15]));

        assert_eq!(tally.true_positives, 3);
        assert_eq!(tally.total_predicted, 5);
        assert_eq!(tally.total_ground_truth, 9);
        assert_eq!(tally.videos, 2);
        assert!((tally.precision() - 0.6).abs() < 1e-12);
        assert!((tally.recall() - 3.0 / 9.0).abs() < 1e-12);
        assert_eq!(tally.to_string(), "Precision: 0.600, Recall: 0.333");
    }

    #[test]
    fn test_tally_zero_denominators() {
        let tally = ValidationTally::default();
        assert_eq!(tally.precision(), 0.0);
        assert_eq!(tally.recall(), 0.0);
        assert_eq!(tally.to_string(), "Precision: 0.000, Recall: 0.000");
    }

    #[test]
    fn test_perfect_match() {
        let mut tally = ValidationTally::default();
        tally.add_video(&set(&[3, 14, 15]), &set(&[3, 14, 15]));
        assert_eq!(tally.to_string(), "Precision: 1.000, Recall: 1.000");
    }

    #[test]
    fn test_parse_ground_truth() {
        let parsed = parse_ground_truth("12\n\n  40 \n7\n12\nabc\n-3\n1.5\n");
        assert_eq!(parsed, set(&[7, 12, 40]));
    }

    #[test]
    fn test_load_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let video = Path::new("/data/run_01.mp4");
        let path = ground_truth_path(dir.path(), video);
        assert_eq!(path, dir.path().join("run_01.txt"));

        assert_eq!(load_ground_truth(&path).unwrap(), None);

        fs::write(&path, "5\n10\n").unwrap();
        assert_eq!(load_ground_truth(&path).unwrap(), Some(set(&[5, 10])));
    }
}
