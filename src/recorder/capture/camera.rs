// OpenCV camera capture
//
// Physical camera access through `videoio::VideoCapture`. Frames arrive as
// continuous BGR24 matrices and are copied into owned buffers.

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio;

use super::CaptureDevice;
use crate::recorder::error::{DeviceError, DeviceResult};
use crate::recorder::types::{Frame, Resolution};

pub struct OpenCvCamera {
    capture: videoio::VideoCapture,
    resolution: Resolution,
    fps: f64,
    sequence: u64,
}

impl OpenCvCamera {
    /// Open camera `index` and negotiate resolution and frame rate
    pub fn open(index: i32, requested: Resolution, fps: f64) -> DeviceResult<Self> {
        let mut capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| DeviceError::open(format!("camera {}: {}", index, e)))?;

        let opened = capture
            .is_opened()
            .map_err(|e| DeviceError::open(format!("camera {}: {}", index, e)))?;
        if !opened {
            return Err(DeviceError::open(format!("camera {} is not available", index)));
        }

        // The driver may ignore these; the negotiated values are read back below
        let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, requested.width as f64);
        let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, requested.height as f64);
        let _ = capture.set(videoio::CAP_PROP_FPS, fps);

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
        let actual_fps = capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);

        let resolution = if width > 0 && height > 0 {
            Resolution::new(width, height)
        } else {
            requested
        };

        if resolution != requested {
            log::warn!("Camera {} negotiated {} instead of {}", index, resolution, requested);
        }

        Ok(Self {
            capture,
            resolution,
            fps: if actual_fps > 0.0 { actual_fps } else { fps },
            sequence: 0,
        })
    }
}

impl CaptureDevice for OpenCvCamera {
    fn read_frame(&mut self) -> DeviceResult<Frame> {
        let mut mat = Mat::default();
        let grabbed = self
            .capture
            .read(&mut mat)
            .map_err(|e| DeviceError::read(e.to_string()))?;
        if !grabbed || mat.empty() {
            return Err(DeviceError::read("camera returned no frame"));
        }

        let resolution = Resolution::new(mat.cols() as u32, mat.rows() as u32);
        let data = mat
            .data_bytes()
            .map_err(|e| DeviceError::read(format!("non-continuous frame: {}", e)))?
            .to_vec();

        let frame = Frame::new(resolution, data, self.sequence);
        self.sequence += 1;
        if !frame.is_well_formed() {
            return Err(DeviceError::read(format!(
                "unexpected frame layout ({} bytes for {})",
                frame.data.len(),
                resolution
            )));
        }
        Ok(frame)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn close(&mut self) {
        if let Err(e) = self.capture.release() {
            log::warn!("Failed to release camera: {}", e);
        }
    }
}
