//! Device descriptors and the driver binding seam

use serde::{Deserialize, Serialize};

use super::format::StreamFormat;
use super::frame::{PixelFormat, Resolution};
use crate::error::{CameraError, Result};
use crate::session::control::ControlValue;

pub const DEVICE_COUNT_MAX: usize = 16;
pub const DEVICE_NAME_LENGTH_MAX: usize = 32;
pub const RESOLUTION_COUNT_MAX: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingDirection {
    Rear,
    Front,
    External,
}

/// Enumerated capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub facing: FacingDirection,
    pub formats: Vec<PixelFormat>,
    pub preview_resolutions: Vec<Resolution>,
    pub video_resolutions: Vec<Resolution>,
}

impl DeviceInfo {
    pub fn validate(&self) -> Result<()> {
        if self.name.len() >= DEVICE_NAME_LENGTH_MAX
            || self.preview_resolutions.len() > RESOLUTION_COUNT_MAX
            || self.video_resolutions.len() > RESOLUTION_COUNT_MAX
        {
            return Err(CameraError::Internal);
        }
        Ok(())
    }

    pub fn supports_preview(&self, format: &StreamFormat) -> bool {
        self.formats.contains(&format.format)
            && self.preview_resolutions.contains(&format.resolution)
    }

    pub fn supports_video(&self, format: &StreamFormat) -> bool {
        self.formats.contains(&format.format) && self.video_resolutions.contains(&format.resolution)
    }
}

/// Producer streams, each with its own buffer slot namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Preview,
    Video,
    Capture,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Preview, StreamKind::Video, StreamKind::Capture];

    pub const fn as_str(self) -> &'static str {
        match self {
            StreamKind::Preview => "preview",
            StreamKind::Video => "video",
            StreamKind::Capture => "capture",
        }
    }

    pub(crate) const fn slot(self) -> usize {
        match self {
            StreamKind::Preview => 0,
            StreamKind::Video => 1,
            StreamKind::Capture => 2,
        }
    }
}

/// Capability set a concrete driver implements.
///
/// The session calls these only after its own state checks passed, so an
/// implementation does not need to track HAL state. Frames and hardware
/// events flow back through a [`crate::session::StreamProducer`].
pub trait DeviceBinding: Send + Sync {
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    fn open(&self, index: u32) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn start_stream(&self, stream: StreamKind, format: &StreamFormat) -> Result<()>;

    fn stop_stream(&self, stream: StreamKind) -> Result<()>;

    fn start_auto_focus(&self) -> Result<()>;

    fn stop_auto_focus(&self) -> Result<()>;

    /// Pushes one parameter to the hardware. `DeviceNotSupported` when the
    /// device cannot honor it.
    fn apply_control(&self, value: &ControlValue) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            index: 0,
            name: "rear".into(),
            facing: FacingDirection::Rear,
            formats: vec![PixelFormat::Nv12],
            preview_resolutions: vec![Resolution::new(1920, 1080)],
            video_resolutions: vec![Resolution::new(1280, 720)],
        }
    }

    #[test]
    fn preview_support_checks_format_and_resolution() {
        let dev = info();
        let ok = StreamFormat::new(PixelFormat::Nv12, Resolution::new(1920, 1080), 30);
        let bad_fmt = StreamFormat::new(PixelFormat::Yuyv, Resolution::new(1920, 1080), 30);
        let bad_res = StreamFormat::new(PixelFormat::Nv12, Resolution::new(1280, 720), 30);
        assert!(dev.supports_preview(&ok));
        assert!(!dev.supports_preview(&bad_fmt));
        assert!(!dev.supports_preview(&bad_res));
        assert!(dev.supports_video(&bad_res));
    }

    #[test]
    fn long_names_are_rejected() {
        let mut dev = info();
        dev.name = "x".repeat(DEVICE_NAME_LENGTH_MAX);
        assert_eq!(dev.validate(), Err(CameraError::Internal));
    }
}
