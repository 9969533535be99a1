//! Camera HAL core: session state machine, buffer slot pools and event
//! fan-out between a multimedia framework and a camera driver binding.

pub mod capture;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod utils;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::capture::device::FacingDirection;
use crate::capture::frame::PixelFormat;
pub use crate::error::{CameraError, Result};
pub use crate::session::{CameraHal, DeviceSession, StreamProducer};

/// Upper bound for any per-stream slot count
pub const MAX_STREAM_BUFFERS: usize = 32;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub hal: HalConfig,
    pub capture: CaptureConfig,
}

/// Per-session buffer and capture behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalConfig {
    pub preview_buffers: usize,
    pub video_buffers: usize,
    pub capture_buffers: usize,
    /// Still capture runs alongside preview instead of pausing it
    pub zero_shutter_lag: bool,
}

/// Stream the demo binary asks for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub facing: Option<FacingDirection>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: u32,
}

impl HalConfig {
    pub fn validate(&self) -> Result<()> {
        for count in [self.preview_buffers, self.video_buffers, self.capture_buffers] {
            if count == 0 || count > MAX_STREAM_BUFFERS {
                return Err(CameraError::InvalidParameter);
            }
        }
        Ok(())
    }
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            preview_buffers: 4,
            video_buffers: 6,
            capture_buffers: 3,
            zero_shutter_lag: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hal: HalConfig::default(),
            capture: CaptureConfig {
                facing: Some(FacingDirection::Rear),
                format: PixelFormat::Nv12,
                width: 1280,
                height: 720,
                fps: 30,
                frames: 90,
            },
        }
    }
}

impl Config {
    /// Layers an optional TOML file and `CAMHAL_` environment variables
    /// over the defaults. Nested keys use `__`, e.g. `CAMHAL_HAL__ZERO_SHUTTER_LAG`.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("CAMHAL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_hal_config_is_valid() {
        assert!(HalConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_buffers_are_rejected() {
        let cfg = HalConfig {
            video_buffers: 0,
            ..HalConfig::default()
        };
        assert_eq!(cfg.validate(), Err(CameraError::InvalidParameter));
    }

    #[test]
    fn too_many_buffers_are_rejected() {
        let cfg = HalConfig {
            capture_buffers: MAX_STREAM_BUFFERS + 1,
            ..HalConfig::default()
        };
        assert_eq!(cfg.validate(), Err(CameraError::InvalidParameter));
    }

    #[test]
    fn load_merges_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camhal.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[hal]\npreview_buffers = 8\nzero_shutter_lag = true").unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.hal.preview_buffers, 8);
        assert!(cfg.hal.zero_shutter_lag);
        assert_eq!(cfg.hal.video_buffers, HalConfig::default().video_buffers);
        assert_eq!(cfg.capture.fps, 30);
    }

    #[test]
    fn load_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
