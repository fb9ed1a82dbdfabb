// Recorder configuration
//
// Loaded from `config.json` (or a `.toml` file). Keys that are absent take
// their documented default; a file that cannot be read, parsed, or
// validated is discarded as a whole and every key falls back to default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::ConfigError;
use super::types::Resolution;

/// Which capture device implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// A physical camera at `camera_index`
    Camera,
    /// Built-in moving test pattern
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub camera_index: i32,
    pub fps: f64,
    /// Preferred codec, tried first
    pub codec: String,
    /// Codecs tried in order after `codec`
    pub fallback_codecs: Vec<String>,
    /// Requested capture size as `[width, height]`
    pub resolution: [u32; 2],
    pub font_scale: f64,
    pub font_thickness: i32,
    /// Overlay text colour in BGR order
    pub font_color: [u8; 3],
    pub output_dir: PathBuf,
    pub max_duration_secs: u64,
    pub warning_window_secs: u64,
    pub max_consecutive_read_failures: u32,
    pub read_retry_backoff_ms: u64,
    pub min_tracking_number_len: usize,
    pub device: DeviceKind,
    /// Draw recording status onto preview frames
    pub overlay: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            fps: 30.0,
            codec: "avc1".to_string(),
            fallback_codecs: vec!["mp4v".to_string(), "XVID".to_string(), "I420".to_string()],
            resolution: [1920, 1080],
            font_scale: 1.0,
            font_thickness: 2,
            font_color: [0, 0, 255],
            output_dir: PathBuf::from("videos"),
            max_duration_secs: 300,
            warning_window_secs: 30,
            max_consecutive_read_failures: 30,
            read_retry_backoff_ms: 100,
            min_tracking_number_len: 1,
            device: DeviceKind::Camera,
            overlay: true,
        }
    }
}

impl RecorderConfig {
    /// Load configuration, falling back to defaults on any problem
    ///
    /// A missing file is the normal first-run case and is not logged.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config = if is_toml {
            Self::parse_toml(&content)?
        } else {
            Self::parse_json(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("invalid JSON: {}", e)))
    }

    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(format!("invalid TOML: {}", e)))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::Invalid(format!("fps must be positive, got {}", self.fps)));
        }
        if self.resolution[0] == 0 || self.resolution[1] == 0 {
            return Err(ConfigError::Invalid(format!(
                "resolution must be non-zero, got {}x{}",
                self.resolution[0], self.resolution[1]
            )));
        }
        if self.max_duration_secs == 0 {
            return Err(ConfigError::Invalid("max_duration_secs must be non-zero".to_string()));
        }
        if self.warning_window_secs >= self.max_duration_secs {
            return Err(ConfigError::Invalid(format!(
                "warning_window_secs ({}) must be less than max_duration_secs ({})",
                self.warning_window_secs, self.max_duration_secs
            )));
        }
        if self.codec_preferences().is_empty() {
            return Err(ConfigError::Invalid("no codec configured".to_string()));
        }
        if self.max_consecutive_read_failures == 0 {
            return Err(ConfigError::Invalid(
                "max_consecutive_read_failures must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Ordered, de-duplicated codec list: `codec` first, then the fallbacks
    pub fn codec_preferences(&self) -> Vec<String> {
        let mut codecs: Vec<String> = Vec::new();
        for codec in std::iter::once(&self.codec).chain(self.fallback_codecs.iter()) {
            let codec = codec.trim();
            if !codec.is_empty() && !codecs.iter().any(|c| c == codec) {
                codecs.push(codec.to_string());
            }
        }
        codecs
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.resolution[0], self.resolution[1])
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn warning_window(&self) -> Duration {
        Duration::from_secs(self.warning_window_secs)
    }

    pub fn read_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.read_retry_backoff_ms)
    }
}
