//! Deferred redness and entropy for stage-1 survivors
//!
//! Only frames that survived stage 1 pay for the color metrics. A frame that
//! fails to decode here keeps its candidacy with zero redness and entropy.

use tracing::{debug, info, instrument};

use crate::common::{Candidate, Result};
use crate::metrics;
use crate::video_stream::{decode_or_skip, FrameSource};

/// Fill in redness and entropy for every candidate
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn enrich_candidates<S: FrameSource + ?Sized>(
    source: &mut S,
    candidates: &mut [Candidate],
) -> Result<()> {
    info!("Computing redness and entropy for {} candidates", candidates.len());

    let mut degraded = 0usize;
    for candidate in candidates.iter_mut() {
        let (redness, entropy) = match decode_or_skip(source, candidate.frame_index()) {
            Some(frame) => metrics::color_metrics(&frame)?,
            None => {
                degraded += 1;
                (0.0, 0.0)
            }
        };
        candidate.set_color_metrics(redness, entropy);
    }

    if degraded > 0 {
        debug!("{} candidates could not be re-decoded and keep zero color metrics", degraded);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_frame, red_band_frame, split_frame, SyntheticVideo};

    #[test]
    fn test_enrichment_fills_color_metrics() {
        let mut video = SyntheticVideo::new(10.0, vec![
            Some(red_band_frame(10, 10, 5).unwrap()),
            Some(split_frame(10, 10).unwrap()),
            None,
            Some(flat_frame(10, 10, 60).unwrap()),
        ]);

        let mut candidates = vec![
            Candidate::from_sharpness(0, 12.0, 10.0),
            Candidate::from_sharpness(1, 30.0, 10.0),
            Candidate::from_sharpness(2, 44.0, 10.0),
        ];
        enrich_candidates(&mut video, &mut candidates).unwrap();

        assert!((candidates[0].redness - 0.5).abs() < 1e-12);
        assert!((candidates[0].entropy - 1.0).abs() < 1e-12);

        assert_eq!(candidates[1].redness, 0.0);
        assert!((candidates[1].entropy - 1.0).abs() < 1e-12);

        // Undecodable frame stays a candidate with zeroed color metrics
        assert_eq!(candidates[2].redness, 0.0);
        assert_eq!(candidates[2].entropy, 0.0);
        assert_eq!(candidates[2].sharpness, 44.0);

        // Frame 3 was never a candidate and is never decoded
        assert_eq!(video.reads, vec![0, 1, 2]);
    }
}
