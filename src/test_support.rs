//! In-memory frame sources and frame builders shared by the unit tests.

use opencv::core::{Mat, Rect, Scalar, CV_8UC3};
use opencv::{imgproc, prelude::*};

use crate::common::Result;
use crate::video_stream::FrameSource;

/// A timeline of pre-built frames; `None` entries fail to decode
pub struct SyntheticVideo {
    fps: f64,
    frames: Vec<Option<Mat>>,
    pub reads: Vec<u32>,
}

impl SyntheticVideo {
    pub fn new(fps: f64, frames: Vec<Option<Mat>>) -> Self {
        Self { fps, frames, reads: Vec::new() }
    }
}

impl FrameSource for SyntheticVideo {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn frame_at(&mut self, index: u32) -> Result<Option<Mat>> {
        self.reads.push(index);
        match self.frames.get(index as usize) {
            Some(Some(frame)) => Ok(Some(frame.try_clone()?)),
            _ => Ok(None),
        }
    }
}

/// Uniform gray BGR frame
pub fn flat_frame(width: i32, height: i32, value: u8) -> Result<Mat> {
    let v = value as f64;
    Ok(Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::new(v, v, v, 0.0))?)
}

/// Uniform BGR frame of one color
pub fn solid_frame(width: i32, height: i32, bgr: (u8, u8, u8)) -> Result<Mat> {
    Ok(Mat::new_rows_cols_with_default(
        height,
        width,
        CV_8UC3,
        Scalar::new(bgr.0 as f64, bgr.1 as f64, bgr.2 as f64, 0.0),
    )?)
}

/// Gray checkerboard alternating between `128 - amplitude` and `128 + amplitude`
///
/// Sharpness grows with the amplitude; zero amplitude is a flat frame.
pub fn checkerboard_frame(width: i32, height: i32, cell: i32, amplitude: u8) -> Result<Mat> {
    let low = 128.0 - amplitude.min(127) as f64;
    let high = 128.0 + amplitude.min(127) as f64;
    let mut frame = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(low))?;
    for y in (0..height).step_by(cell as usize) {
        for x in (0..width).step_by(cell as usize) {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                imgproc::rectangle(
                    &mut frame,
                    Rect::new(x, y, cell, cell),
                    Scalar::all(high),
                    imgproc::FILLED,
                    imgproc::LINE_8,
                    0,
                )?;
            }
        }
    }
    Ok(frame)
}

/// Black frame whose left `red_columns` columns are pure red
pub fn red_band_frame(width: i32, height: i32, red_columns: i32) -> Result<Mat> {
    let mut frame = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0))?;
    if red_columns > 0 {
        imgproc::rectangle(
            &mut frame,
            Rect::new(0, 0, red_columns, height),
            Scalar::new(0.0, 0.0, 255.0, 0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
    }
    Ok(frame)
}

/// Frame whose top half is black and bottom half white
pub fn split_frame(width: i32, height: i32) -> Result<Mat> {
    let mut frame = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0))?;
    imgproc::rectangle(
        &mut frame,
        Rect::new(0, height / 2, width, height - height / 2),
        Scalar::all(255.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    Ok(frame)
}
