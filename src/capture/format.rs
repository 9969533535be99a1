//! Stream format negotiated for preview and video streams

use serde::{Deserialize, Serialize};

use super::frame::{PixelFormat, Resolution};
use crate::error::{CameraError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Stream and still-capture format in one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub format: PixelFormat,
    pub resolution: Resolution,
    pub fps: u32,
    pub rotation: Rotation,
    pub flip: Flip,
    pub capture_format: PixelFormat,
    pub capture_resolution: Resolution,
    pub capture_quality: u32,
}

impl StreamFormat {
    pub fn new(format: PixelFormat, resolution: Resolution, fps: u32) -> Self {
        Self {
            format,
            resolution,
            fps,
            capture_resolution: resolution,
            ..Self::default()
        }
    }

    /// Rejects formats that are malformed regardless of device.
    pub fn validate(&self) -> Result<()> {
        if self.resolution.is_empty() || self.fps == 0 {
            return Err(CameraError::InvalidParameter);
        }
        if self.capture_resolution.is_empty() {
            return Err(CameraError::InvalidParameter);
        }
        if !(1..=100).contains(&self.capture_quality) {
            return Err(CameraError::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            format: PixelFormat::Nv12,
            resolution: Resolution::new(640, 480),
            fps: 30,
            rotation: Rotation::Rotate0,
            flip: Flip::None,
            capture_format: PixelFormat::Jpeg,
            capture_resolution: Resolution::new(640, 480),
            capture_quality: 95,
        }
    }
}
