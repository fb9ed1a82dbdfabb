// OpenCV FOURCC writer
//
// `videoio::VideoWriter` picks the codec from a four character code
// (`avc1`, `mp4v`, `XVID`, ...). Opening succeeds only if the installed
// OpenCV build can actually produce that codec.

use std::path::Path;

use opencv::core::{self, Mat, Scalar, Size};
use opencv::prelude::*;
use opencv::videoio;

use super::{CodecBackend, VideoWriter};
use crate::recorder::error::{EncodeError, EncodeResult};
use crate::recorder::types::{Frame, Resolution};

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvBackend;

impl CodecBackend for OpenCvBackend {
    fn name(&self) -> &str {
        "opencv"
    }

    fn extension(&self) -> &str {
        "mp4"
    }

    fn open(
        &self,
        path: &Path,
        codec: &str,
        fps: f64,
        size: Resolution,
    ) -> EncodeResult<Box<dyn VideoWriter>> {
        let chars: Vec<char> = codec.chars().collect();
        let &[a, b, c, d] = chars.as_slice() else {
            return Err(EncodeError::UnsupportedCodec(codec.to_string()));
        };

        let fourcc = videoio::VideoWriter::fourcc(a, b, c, d)
            .map_err(|e| EncodeError::open(codec, e))?;
        let filename = path
            .to_str()
            .ok_or_else(|| EncodeError::open(codec, "path is not valid UTF-8"))?;

        let writer = videoio::VideoWriter::new(
            filename,
            fourcc,
            fps,
            Size::new(size.width as i32, size.height as i32),
            true,
        )
        .map_err(|e| EncodeError::open(codec, e))?;

        if !writer.is_opened().map_err(|e| EncodeError::open(codec, e))? {
            return Err(EncodeError::open(codec, "writer did not open"));
        }

        Ok(Box::new(FourccWriter {
            writer: Some(writer),
            size,
        }))
    }
}

struct FourccWriter {
    writer: Option<videoio::VideoWriter>,
    size: Resolution,
}

impl VideoWriter for FourccWriter {
    fn write(&mut self, frame: &Frame) -> EncodeResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EncodeError::write("stream already finished"))?;

        let mut mat = Mat::new_rows_cols_with_default(
            self.size.height as i32,
            self.size.width as i32,
            core::CV_8UC3,
            Scalar::all(0.0),
        )
        .map_err(|e| EncodeError::write(e.to_string()))?;
        mat.data_bytes_mut()
            .map_err(|e| EncodeError::write(e.to_string()))?
            .copy_from_slice(&frame.data);

        writer
            .write(&mat)
            .map_err(|e| EncodeError::write(e.to_string()))
    }

    fn finish(&mut self) -> EncodeResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .release()
                .map_err(|e| EncodeError::write(format!("release failed: {}", e)))?;
        }
        Ok(())
    }
}
