// Preview status overlay
//
// Draws recording status onto a copy of a frame for the preview stream.
// The frame handed to the encoder is never touched.

use std::time::Duration;

use super::config::RecorderConfig;
use super::types::{Frame, Resolution, SessionState};

/// BGR red
const RED: [u8; 3] = [0, 0, 255];

/// Recording indicator position and radius in pixels
const DOT_CENTER: (i64, i64) = (20, 150);
const DOT_RADIUS: i64 = 10;

/// Height of the band marking a failed session
const ERROR_BAND_HEIGHT: u32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub enabled: bool,
    pub font_scale: f64,
    pub font_thickness: i32,
    /// BGR
    pub font_color: [u8; 3],
}

impl OverlayStyle {
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            enabled: config.overlay,
            font_scale: config.font_scale,
            font_thickness: config.font_thickness,
            font_color: config.font_color,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::from_config(&RecorderConfig::default())
        }
    }
}

/// What the overlay shows about the current session
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingBadge {
    pub tracking_number: String,
    pub elapsed: Duration,
    /// Frames written per second so far
    pub fps: f64,
    pub state: SessionState,
}

/// `mm:ss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Return a copy of `frame` with the badge drawn on it
pub fn render(frame: &Frame, badge: &RecordingBadge, style: &OverlayStyle) -> Frame {
    if !style.enabled || !frame.is_well_formed() {
        return frame.clone();
    }

    let size = frame.resolution;
    let mut pixels = frame.data.to_vec();
    match badge.state {
        SessionState::Recording => fill_circle(&mut pixels, size, DOT_CENTER, DOT_RADIUS, RED),
        SessionState::Error => {
            let top = size.height.saturating_sub(ERROR_BAND_HEIGHT);
            fill_rows(&mut pixels, size, top..size.height, RED);
        }
        SessionState::Idle | SessionState::Stopping => {}
    }

    #[cfg(feature = "opencv")]
    if let Err(e) = text::draw(&mut pixels, size, badge, style) {
        log::debug!("Overlay text skipped: {}", e);
    }

    Frame {
        resolution: frame.resolution,
        format: frame.format,
        data: pixels.into(),
        sequence: frame.sequence,
        captured_at: frame.captured_at,
    }
}

fn put_pixel(pixels: &mut [u8], size: Resolution, x: u32, y: u32, color: [u8; 3]) {
    let i = (y as usize * size.width as usize + x as usize) * 3;
    pixels[i..i + 3].copy_from_slice(&color);
}

fn fill_circle(
    pixels: &mut [u8],
    size: Resolution,
    center: (i64, i64),
    radius: i64,
    color: [u8; 3],
) {
    let (cx, cy) = center;
    let y_range = (cy - radius).max(0)..=(cy + radius).min(size.height as i64 - 1);
    let x_range = (cx - radius).max(0)..=(cx + radius).min(size.width as i64 - 1);

    for y in y_range {
        for x in x_range.clone() {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= radius * radius {
                put_pixel(pixels, size, x as u32, y as u32, color);
            }
        }
    }
}

fn fill_rows(pixels: &mut [u8], size: Resolution, rows: std::ops::Range<u32>, color: [u8; 3]) {
    for y in rows {
        for x in 0..size.width {
            put_pixel(pixels, size, x, y, color);
        }
    }
}

#[cfg(feature = "opencv")]
mod text {
    use opencv::core::{self, Mat, Point, Scalar};
    use opencv::imgproc;
    use opencv::prelude::*;

    use super::{RED, RecordingBadge, OverlayStyle, format_elapsed};
    use crate::recorder::types::{Resolution, SessionState};

    fn scalar(bgr: [u8; 3]) -> Scalar {
        Scalar::new(bgr[0] as f64, bgr[1] as f64, bgr[2] as f64, 0.0)
    }

    pub(super) fn draw(
        pixels: &mut [u8],
        size: Resolution,
        badge: &RecordingBadge,
        style: &OverlayStyle,
    ) -> opencv::Result<()> {
        let mut mat = Mat::new_rows_cols_with_default(
            size.height as i32,
            size.width as i32,
            core::CV_8UC3,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(pixels);

        let mut line = |text: &str, y: i32, color: [u8; 3]| {
            imgproc::put_text(
                &mut mat,
                text,
                Point::new(10, y),
                imgproc::FONT_HERSHEY_SIMPLEX,
                style.font_scale,
                scalar(color),
                style.font_thickness,
                imgproc::LINE_8,
                false,
            )
        };

        match badge.state {
            SessionState::Recording => {
                line(&format!("ID: {}", badge.tracking_number), 30, style.font_color)?;
                line(&format!("Time: {}", format_elapsed(badge.elapsed)), 70, style.font_color)?;
                line(&format!("FPS: {}", badge.fps as u32), 110, style.font_color)?;
            }
            SessionState::Error => {
                line("RECORDING ERROR", size.height as i32 - 30, RED)?;
            }
            SessionState::Idle | SessionState::Stopping => {}
        }

        pixels.copy_from_slice(mat.data_bytes()?);
        Ok(())
    }
}
