//! Per-frame quality metrics: sharpness, redness ratio and entropy
//!
//! All three are pure functions of one decoded BGR frame. Sharpness is the
//! variance of the 3x3 Laplacian over the grayscale image, redness is the
//! fraction of pixels inside the two red hue bands of OpenCV's 0-180 HSV
//! space, and entropy is the base-2 Shannon entropy of the 256-bin grayscale
//! histogram.

use opencv::{core::{self, Mat, Scalar}, imgproc, prelude::*};
use tracing::{instrument, trace};
use crate::common::{FrameMetrics, FrameSelectError, Result};

/// Lower red band: hue 0-10, saturation >= 30, value >= 50
const RED_LOW_BAND: ([f64; 3], [f64; 3]) = ([0.0, 30.0, 50.0], [10.0, 255.0, 255.0]);
/// Upper red band: hue 160-180, saturation >= 30, value >= 50
const RED_HIGH_BAND: ([f64; 3], [f64; 3]) = ([160.0, 30.0, 50.0], [180.0, 255.0, 255.0]);

const HISTOGRAM_BINS: usize = 256;

/// Compute all three metrics for one frame
#[instrument(level = "trace", skip(frame))]
pub fn frame_metrics(frame: &Mat) -> Result<FrameMetrics> {
    let gray = to_grayscale(frame)?;
    let metrics = FrameMetrics {
        sharpness: laplacian_variance(&gray)?,
        redness: redness_ratio(frame)?,
        entropy: shannon_entropy(&intensity_histogram(&gray)?),
    };
    trace!("Metrics: sharp={:.2}, red={:.4}, entropy={:.3}",
           metrics.sharpness, metrics.redness, metrics.entropy);
    Ok(metrics)
}

/// Variance of the Laplacian of the grayscale frame
pub fn sharpness(frame: &Mat) -> Result<f64> {
    laplacian_variance(&to_grayscale(frame)?)
}

/// Redness and entropy together, sharing one grayscale conversion
pub fn color_metrics(frame: &Mat) -> Result<(f64, f64)> {
    let gray = to_grayscale(frame)?;
    Ok((redness_ratio(frame)?, shannon_entropy(&intensity_histogram(&gray)?)))
}

/// Fraction of pixels whose HSV value falls in either red band
pub fn redness_ratio(frame: &Mat) -> Result<f64> {
    if frame.channels() != 3 {
        return Err(FrameSelectError::frame_error(0,
            format!("Redness needs a 3-channel BGR frame, got {} channels", frame.channels())));
    }

    let mut hsv = Mat::default();
    imgproc::cvt_color_def(frame, &mut hsv, imgproc::COLOR_BGR2HSV)?;

    let low = band_mask(&hsv, RED_LOW_BAND)?;
    let high = band_mask(&hsv, RED_HIGH_BAND)?;
    let mut mask = Mat::default();
    core::bitwise_or(&low, &high, &mut mask, &core::no_array())?;

    let total = mask.total();
    if total == 0 {
        return Ok(0.0);
    }
    Ok(core::count_non_zero(&mask)? as f64 / total as f64)
}

/// Shannon entropy (bits) of a grayscale intensity histogram
///
/// Returns 0.0 for an empty histogram.
pub fn shannon_entropy(histogram: &[u64; HISTOGRAM_BINS]) -> f64 {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

fn to_grayscale(frame: &Mat) -> Result<Mat> {
    if frame.empty() {
        return Err(FrameSelectError::frame_error(0, "Empty frame provided"));
    }
    match frame.channels() {
        1 => Ok(frame.try_clone()?),
        3 => {
            let mut gray = Mat::default();
            imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
            Ok(gray)
        }
        n => Err(FrameSelectError::frame_error(0, format!("Unsupported channel count: {}", n))),
    }
}

fn laplacian_variance(gray: &Mat) -> Result<f64> {
    let mut laplacian = Mat::default();
    imgproc::laplacian(gray, &mut laplacian, core::CV_64F, 1, 1.0, 0.0, core::BORDER_DEFAULT)?;

    let mut mean = Mat::default();
    let mut stddev = Mat::default();
    core::mean_std_dev(&laplacian, &mut mean, &mut stddev, &core::no_array())?;

    let sigma = *stddev.at::<f64>(0)?;
    Ok(sigma * sigma)
}

fn intensity_histogram(gray: &Mat) -> Result<[u64; HISTOGRAM_BINS]> {
    let owned;
    let gray = if gray.is_continuous() {
        gray
    } else {
        owned = gray.try_clone()?;
        &owned
    };
    let mut histogram = [0u64; HISTOGRAM_BINS];
    for &value in gray.data_bytes()? {
        histogram[value as usize] += 1;
    }
    Ok(histogram)
}

fn band_mask(hsv: &Mat, band: ([f64; 3], [f64; 3])) -> Result<Mat> {
    let (lo, hi) = band;
    let mut mask = Mat::default();
    core::in_range(
        hsv,
        &Scalar::new(lo[0], lo[1], lo[2], 0.0),
        &Scalar::new(hi[0], hi[1], hi[2], 0.0),
        &mut mask,
    )?;
    Ok(mask)
}
