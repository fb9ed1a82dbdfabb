// YUV4MPEG2 writer
//
// Uncompressed 4:2:0 output that needs no external codec library. BGR
// frames are converted with BT.601 studio-range coefficients; chroma is the
// mean of each 2x2 block.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{CodecBackend, VideoWriter};
use crate::recorder::error::{EncodeError, EncodeResult};
use crate::recorder::types::{Frame, Resolution};

/// Codec names this backend answers to
const CODECS: [&str; 2] = ["I420", "y4m"];

#[derive(Debug, Clone, Copy, Default)]
pub struct Y4mBackend;

impl CodecBackend for Y4mBackend {
    fn name(&self) -> &str {
        "y4m"
    }

    fn extension(&self) -> &str {
        "y4m"
    }

    fn open(
        &self,
        path: &Path,
        codec: &str,
        fps: f64,
        size: Resolution,
    ) -> EncodeResult<Box<dyn VideoWriter>> {
        if !CODECS.iter().any(|c| c.eq_ignore_ascii_case(codec)) {
            return Err(EncodeError::UnsupportedCodec(codec.to_string()));
        }
        if size.width == 0 || size.height == 0 {
            return Err(EncodeError::open(codec, format!("invalid frame size {}", size)));
        }

        let file = File::create(path).map_err(|e| EncodeError::open(codec, e))?;
        let mut out = BufWriter::new(file);
        let (num, den) = fps_fraction(fps);
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C420jpeg",
            size.width, size.height, num, den
        )
        .map_err(|e| EncodeError::open(codec, e))?;

        Ok(Box::new(Y4mWriter {
            out: Some(out),
            size,
            planes: Vec::new(),
        }))
    }
}

struct Y4mWriter {
    out: Option<BufWriter<File>>,
    size: Resolution,
    planes: Vec<u8>,
}

impl VideoWriter for Y4mWriter {
    fn write(&mut self, frame: &Frame) -> EncodeResult<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| EncodeError::write("stream already finished"))?;

        bgr_to_i420(&frame.data, self.size, &mut self.planes);
        out.write_all(b"FRAME\n")
            .and_then(|_| out.write_all(&self.planes))
            .map_err(|e| EncodeError::write(e.to_string()))
    }

    fn finish(&mut self) -> EncodeResult<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        Ok(())
    }
}

/// Frame rate as a Y4M `F` ratio
pub fn fps_fraction(fps: f64) -> (u32, u32) {
    if (fps - fps.round()).abs() < 1e-6 {
        (fps.round().max(1.0) as u32, 1)
    } else {
        ((fps * 1000.0).round().max(1.0) as u32, 1000)
    }
}

/// Convert packed BGR24 into planar I420, reusing `planes`
pub fn bgr_to_i420(bgr: &[u8], size: Resolution, planes: &mut Vec<u8>) {
    let w = size.width as usize;
    let h = size.height as usize;
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);

    planes.clear();
    planes.resize(w * h + 2 * cw * ch, 0);
    let (y_plane, chroma) = planes.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    let pixel = |x: usize, y: usize| -> (i32, i32, i32) {
        let i = (y * w + x) * 3;
        (bgr[i + 2] as i32, bgr[i + 1] as i32, bgr[i] as i32)
    };

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = pixel(x, y);
            y_plane[y * w + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8;
        }
    }

    for cy in 0..ch {
        for cx in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0, 0, 0, 0);
            for y in (cy * 2)..((cy * 2 + 2).min(h)) {
                for x in (cx * 2)..((cx * 2 + 2).min(w)) {
                    let (pr, pg, pb) = pixel(x, y);
                    r += pr;
                    g += pg;
                    b += pb;
                    n += 1;
                }
            }
            let (r, g, b) = (r / n, g / n, b / n);
            u_plane[cy * cw + cx] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8;
            v_plane[cy * cw + cx] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8;
        }
    }
}
