//! Stage 2: one winner per fixed-length group by combined score
//!
//! The candidate timeline is cut into `ceil(last_time / group_dur)`
//! contiguous groups. Each non-empty group keeps its best-scoring candidate;
//! an empty group gets a fallback candidate decoded from its midpoint frame,
//! or nothing if that frame cannot be decoded.

use tracing::{debug, info, instrument, trace};

use crate::common::{Candidate, FrameMetrics, FrameSelectError, FrameTimecode, Result};
use crate::config::{ExtractionConfig, ScoreWeights};
use crate::metrics;
use crate::video_stream::{decode_or_skip, FrameSource};

/// Number of groups covering `[0, last_time]`
pub fn group_count(last_time: f64, group_dur: f64) -> usize {
    (last_time / group_dur).ceil().max(0.0) as usize
}

/// Best-scoring candidate, first seen on an exact tie
pub fn best_candidate<'a>(members: &[&'a Candidate], weights: &ScoreWeights) -> Option<&'a Candidate> {
    let mut best: Option<(&Candidate, f64)> = None;
    for &candidate in members {
        let score = weights.score(candidate.sharpness, candidate.redness, candidate.entropy);
        trace!("Frame {} score {:.3}", candidate.frame_index(), score);
        let beats = match best {
            Some((_, best_score)) => score > best_score,
            None => !score.is_nan(),
        };
        if beats {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Run stage 2 over enriched candidates, decoding fallbacks from `source`
///
/// # Errors
/// * `NoSelection` - If no group produced a winner
#[instrument(skip(source, candidates, config), fields(candidates = candidates.len()))]
pub fn select_final<S: FrameSource + ?Sized>(
    source: &mut S,
    candidates: &[Candidate],
    config: &ExtractionConfig,
) -> Result<Vec<Candidate>> {
    let fps = source.fps();
    select_final_with(fps, candidates, config.stage2_dur, &config.weights, |index| {
        match decode_or_skip(source, index) {
            Some(frame) => metrics::frame_metrics(&frame).map(Some),
            None => Ok(None),
        }
    })
}

/// Stage 2 over any fallback probe
///
/// `fallback(index)` returns the metrics of a midpoint frame, or `None` when
/// it cannot be decoded.
pub fn select_final_with<F>(
    fps: f64,
    candidates: &[Candidate],
    group_dur: f64,
    weights: &ScoreWeights,
    mut fallback: F,
) -> Result<Vec<Candidate>>
where
    F: FnMut(u32) -> Result<Option<FrameMetrics>>,
{
    let last_time = candidates
        .iter()
        .map(Candidate::time_sec)
        .fold(f64::NEG_INFINITY, f64::max);
    if candidates.is_empty() {
        return Err(FrameSelectError::NoSelection);
    }

    let groups = group_count(last_time, group_dur);
    info!("Stage 2: scoring {} candidates in {} groups of {:.2}s",
          candidates.len(), groups, group_dur);

    let mut members: Vec<Vec<&Candidate>> = vec![Vec::new(); groups];
    for candidate in candidates {
        let group = (candidate.time_sec() / group_dur).floor() as usize;
        if let Some(bucket) = members.get_mut(group) {
            bucket.push(candidate);
        }
    }

    let mut selected = Vec::with_capacity(groups);
    for (group, bucket) in members.iter().enumerate() {
        if bucket.is_empty() {
            let midpoint = group as f64 * group_dur + group_dur / 2.0;
            let index = FrameTimecode::from_seconds(midpoint, fps).frame_number();
            match fallback(index)? {
                Some(metrics) => {
                    debug!("Group {} empty, fallback frame {}", group, index);
                    selected.push(Candidate::fallback(index, fps, metrics));
                }
                None => debug!("Group {} empty and fallback frame {} undecodable, skipping", group, index),
            }
            continue;
        }

        match best_candidate(bucket, weights) {
            Some(winner) => {
                debug!("Group {}: frame {} wins among {}", group, winner.frame_index(), bucket.len());
                selected.push(winner.clone());
            }
            None => debug!("Group {} has no comparable score, skipping", group),
        }
    }

    if selected.is_empty() {
        return Err(FrameSelectError::NoSelection);
    }

    info!("Stage 2 selected {} frames", selected.len());
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{checkerboard_frame, red_band_frame, SyntheticVideo};

    fn enriched(frame: u32, sharpness: f64, redness: f64, entropy: f64) -> Candidate {
        let mut candidate = Candidate::from_sharpness(frame, sharpness, 10.0);
        candidate.set_color_metrics(redness, entropy);
        candidate
    }

    fn frames(candidates: &[Candidate]) -> Vec<u32> {
        candidates.iter().map(Candidate::frame_index).collect()
    }

    const FALLBACK_METRICS: FrameMetrics = FrameMetrics { sharpness: 7.0, redness: 0.2, entropy: 3.0 };

    #[test]
    fn test_group_count() {
        assert_eq!(group_count(2.3, 1.0), 3);
        assert_eq!(group_count(2.0, 1.0), 2);
        assert_eq!(group_count(1.9, 5.0), 1);
        assert_eq!(group_count(0.0, 1.0), 0);
    }

    #[test]
    fn test_one_winner_per_group_with_fallback() {
        let candidates = vec![
            enriched(2, 10.0, 0.1, 5.0),
            enriched(5, 30.0, 0.0, 2.0),
            enriched(23, 4.0, 0.0, 1.0),
        ];

        let mut asked = Vec::new();
        let selected = select_final_with(10.0, &candidates, 1.0, &ScoreWeights::default(), |index| {
            asked.push(index);
            Ok(Some(FALLBACK_METRICS))
        })
        .unwrap();

        assert_eq!(frames(&selected), vec![5, 15, 23]);
        let flags: Vec<bool> = selected.iter().map(|c| c.is_fallback).collect();
        assert_eq!(flags, vec![false, true, false]);
        assert_eq!(selected[1].metrics(), FALLBACK_METRICS);
        assert!((selected[1].time_sec() - 1.5).abs() < 1e-12);
        assert_eq!(asked, vec![15]);
    }

    #[test]
    fn test_undecodable_fallback_leaves_gap() {
        let candidates = vec![enriched(5, 30.0, 0.0, 2.0), enriched(23, 4.0, 0.0, 1.0)];
        let selected = select_final_with(10.0, &candidates, 1.0, &ScoreWeights::default(), |_| Ok(None))
            .unwrap();
        assert_eq!(frames(&selected), vec![5, 23]);
    }

    #[test]
    fn test_exact_tie_keeps_first_seen() {
        let candidates = vec![enriched(3, 10.0, 0.0, 1.0), enriched(6, 10.0, 0.0, 1.0)];
        let selected = select_final_with(10.0, &candidates, 1.0, &ScoreWeights::default(), |_| Ok(None))
            .unwrap();
        assert_eq!(frames(&selected), vec![3]);
    }

    #[test]
    fn test_redness_weight_is_monotonic() {
        let candidates = vec![enriched(1, 50.0, 0.1, 5.0), enriched(4, 40.0, 0.6, 5.0)];

        let mut last_redness = f64::NEG_INFINITY;
        for w_red in [0.0, 1.0, 10.0, 100.0, 1000.0] {
            let weights = ScoreWeights { redness: w_red, ..ScoreWeights::default() };
            let selected = select_final_with(10.0, &candidates, 1.0, &weights, |_| Ok(None)).unwrap();
            assert!(selected[0].redness >= last_redness, "w_red={} lowered redness", w_red);
            last_redness = selected[0].redness;
        }
        assert_eq!(last_redness, 0.6);

        let sharp_only = ScoreWeights { redness: 0.0, ..ScoreWeights::default() };
        let selected = select_final_with(10.0, &candidates, 1.0, &sharp_only, |_| Ok(None)).unwrap();
        assert_eq!(frames(&selected), vec![1]);
    }

    #[test]
    fn test_candidate_on_last_group_boundary_is_not_considered() {
        let candidates = vec![enriched(5, 1.0, 0.0, 0.0), enriched(20, 99.0, 0.0, 0.0)];
        let selected = select_final_with(10.0, &candidates, 1.0, &ScoreWeights::default(), |_| {
            Ok(Some(FALLBACK_METRICS))
        })
        .unwrap();
        assert_eq!(frames(&selected), vec![5, 15]);
    }

    #[test]
    fn test_at_most_one_per_group() {
        let candidates: Vec<Candidate> = (0..60)
            .map(|i| enriched(i, (i % 7) as f64, 0.01 * (i % 3) as f64, 2.0))
            .collect();
        let selected = select_final_with(10.0, &candidates, 0.7, &ScoreWeights::default(), |_| {
            Ok(Some(FALLBACK_METRICS))
        })
        .unwrap();

        assert!(selected.len() <= group_count(5.9, 0.7));
        let mut groups: Vec<usize> = selected
            .iter()
            .map(|c| (c.time_sec() / 0.7).floor() as usize)
            .collect();
        let before = groups.len();
        groups.dedup();
        assert_eq!(groups.len(), before);
    }

    #[test]
    fn test_empty_results_are_errors() {
        let none = select_final_with(10.0, &[], 1.0, &ScoreWeights::default(), |_| Ok(None));
        assert!(matches!(none, Err(FrameSelectError::NoSelection)));

        // One group, empty, with an undecodable midpoint
        let candidates = vec![enriched(10, 5.0, 0.0, 0.0)];
        let skipped = select_final_with(10.0, &candidates, 1.0, &ScoreWeights::default(), |_| Ok(None));
        assert!(matches!(skipped, Err(FrameSelectError::NoSelection)));
    }

    #[test]
    fn test_select_final_decodes_fallback_frames() {
        let mut frames_in: Vec<_> = (0..30).map(|_| None).collect();
        frames_in[15] = Some(red_band_frame(20, 20, 10).unwrap());
        frames_in[2] = Some(checkerboard_frame(20, 20, 2, 50).unwrap());
        let mut video = SyntheticVideo::new(10.0, frames_in);

        let config = ExtractionConfig { stage2_dur: 1.0, ..ExtractionConfig::default() };
        let candidates = vec![enriched(2, 10.0, 0.0, 1.0), enriched(25, 3.0, 0.0, 1.0)];

        let selected = select_final(&mut video, &candidates, &config).unwrap();
        assert_eq!(frames(&selected), vec![2, 15, 25]);
        assert!(selected[1].is_fallback);
        assert!((selected[1].redness - 0.5).abs() < 1e-12);
        assert!(selected[1].sharpness > 0.0);
        assert_eq!(video.reads, vec![15]);
    }
}
