// Synthetic test-pattern source
//
// Produces scrolling colour bars at the configured rate so the engine can
// run end to end without camera hardware.

use std::time::{Duration, Instant};

use super::CaptureDevice;
use crate::recorder::error::{DeviceError, DeviceResult};
use crate::recorder::types::{Frame, Resolution};

/// BGR colour bars: white, yellow, cyan, green, magenta, red, blue, black
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [0, 255, 255],
    [255, 255, 0],
    [0, 255, 0],
    [255, 0, 255],
    [0, 0, 255],
    [255, 0, 0],
    [0, 0, 0],
];

pub struct SyntheticDevice {
    resolution: Resolution,
    fps: f64,
    paced: bool,
    sequence: u64,
    next_deadline: Option<Instant>,
    closed: bool,
}

impl SyntheticDevice {
    pub fn new(resolution: Resolution, fps: f64) -> Self {
        Self {
            resolution,
            fps: if fps > 0.0 { fps } else { 30.0 },
            paced: true,
            sequence: 0,
            next_deadline: None,
            closed: false,
        }
    }

    /// Return frames as fast as they are requested
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    fn wait_for_next_frame(&mut self) {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Do not try to catch up after a stall
        let base = deadline.max(now);
        self.next_deadline = Some(base + self.frame_interval());
    }

    fn render(&self) -> Vec<u8> {
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let bar_width = (width / BARS.len()).max(1);
        let shift = self.sequence as usize;

        let mut row = Vec::with_capacity(width * 3);
        for x in 0..width {
            let bar = ((x + shift) / bar_width) % BARS.len();
            row.extend_from_slice(&BARS[bar]);
        }

        let mut data = Vec::with_capacity(row.len() * height);
        for _ in 0..height {
            data.extend_from_slice(&row);
        }
        data
    }
}

impl CaptureDevice for SyntheticDevice {
    fn read_frame(&mut self) -> DeviceResult<Frame> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        if self.paced {
            self.wait_for_next_frame();
        }

        let frame = Frame::new(self.resolution, self.render(), self.sequence);
        self.sequence += 1;
        Ok(frame)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_well_formed_and_sequenced() {
        let mut device = SyntheticDevice::new(Resolution::new(16, 4), 30.0).unpaced();
        let first = device.read_frame().unwrap();
        let second = device.read_frame().unwrap();

        assert!(first.is_well_formed());
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_read_after_close_fails() {
        let mut device = SyntheticDevice::new(Resolution::new(2, 2), 30.0).unpaced();
        device.close();
        assert!(matches!(device.read_frame(), Err(DeviceError::Closed)));
    }
}
