// Video encoding module
//
// `Encoder` owns one output file. It walks an ordered codec preference list
// against a `CodecBackend` and keeps the first writer that opens; if none
// does, it fails with `NoCodecAvailable` and leaves no file behind.

pub mod y4m;

#[cfg(feature = "opencv")]
pub mod fourcc;

pub use y4m::Y4mBackend;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::recorder::error::{EncodeError, EncodeResult};
use crate::recorder::types::{Frame, Resolution};

/// An open output stream for one codec
pub trait VideoWriter: Send {
    fn write(&mut self, frame: &Frame) -> EncodeResult<()>;

    /// Flush and release the file; called exactly once by `Encoder`
    fn finish(&mut self) -> EncodeResult<()>;
}

/// Factory for codec-specific writers
pub trait CodecBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// File extension (without dot) of the container this backend writes
    fn extension(&self) -> &str;

    fn open(
        &self,
        path: &Path,
        codec: &str,
        fps: f64,
        size: Resolution,
    ) -> EncodeResult<Box<dyn VideoWriter>>;
}

/// Backend used when the caller does not supply one
#[cfg(feature = "opencv")]
pub fn default_backend() -> Arc<dyn CodecBackend> {
    Arc::new(fourcc::OpenCvBackend)
}

/// Backend used when the caller does not supply one
#[cfg(not(feature = "opencv"))]
pub fn default_backend() -> Arc<dyn CodecBackend> {
    Arc::new(Y4mBackend)
}

/// Writer for a single recording file
pub struct Encoder {
    writer: Option<Box<dyn VideoWriter>>,
    path: PathBuf,
    codec: String,
    size: Resolution,
    frames_written: u64,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("path", &self.path)
            .field("codec", &self.codec)
            .field("open", &self.writer.is_some())
            .field("frames_written", &self.frames_written)
            .finish()
    }
}

impl Encoder {
    /// Open `path` with the first codec in `codecs` that the backend accepts
    pub fn open(
        backend: &dyn CodecBackend,
        path: &Path,
        fps: f64,
        size: Resolution,
        codecs: &[String],
    ) -> EncodeResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let existed_before = path.exists();

        let mut tried = Vec::with_capacity(codecs.len());
        for codec in codecs {
            match backend.open(path, codec, fps, size) {
                Ok(writer) => {
                    log::info!(
                        "Opened {} with codec {} ({}, {} @ {:.1} fps)",
                        path.display(),
                        codec,
                        backend.name(),
                        size,
                        fps
                    );
                    return Ok(Self {
                        writer: Some(writer),
                        path: path.to_path_buf(),
                        codec: codec.clone(),
                        size,
                        frames_written: 0,
                    });
                }
                Err(EncodeError::UnsupportedCodec(_)) => {
                    log::debug!("Codec {} not handled by the {} backend", codec, backend.name());
                    tried.push(codec.clone());
                }
                Err(e) => {
                    log::warn!("Codec {} unavailable: {}", codec, e);
                    tried.push(codec.clone());
                }
            }
        }

        if !existed_before && path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("Failed to remove partial file {}: {}", path.display(), e);
            }
        }

        Err(EncodeError::NoCodecAvailable { tried })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Write one frame
    ///
    /// A frame whose size does not match the stream is rejected rather than
    /// letting the container silently desynchronize.
    pub fn write(&mut self, frame: &Frame) -> EncodeResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EncodeError::write("encoder is closed"))?;

        if frame.resolution != self.size || !frame.is_well_formed() {
            return Err(EncodeError::write(format!(
                "frame {} ({} bytes) does not match stream size {}",
                frame.resolution,
                frame.data.len(),
                self.size
            )));
        }

        writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush and release the file
    ///
    /// Only the first call reaches the writer; later calls return `Ok(())`.
    pub fn close(&mut self) -> EncodeResult<()> {
        match self.writer.take() {
            Some(mut writer) => {
                let result = writer.finish();
                match &result {
                    Ok(()) => log::info!(
                        "Closed {} after {} frames",
                        self.path.display(),
                        self.frames_written
                    ),
                    Err(e) => log::error!("Failed to finalize {}: {}", self.path.display(), e),
                }
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
