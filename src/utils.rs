use tracing::info;

use crate::capture::device::{DeviceInfo, FacingDirection};
use crate::capture::frame::PixelFormat;
use crate::error::{CameraError, Result};

/// Picks the first device that faces `facing` (any, if `None`) and can carry
/// `format`.
pub fn select_device(
    devices: &[DeviceInfo],
    facing: Option<FacingDirection>,
    format: PixelFormat,
) -> Result<&DeviceInfo> {
    info!("Selecting capture device...");

    let found = devices
        .iter()
        .filter(|d| facing.map_or(true, |f| d.facing == f))
        .find(|d| d.formats.contains(&format));

    match found {
        Some(device) => {
            info!("Found {:?} device: {} - {}", device.facing, device.index, device.name);
            Ok(device)
        }
        None => Err(CameraError::DeviceNotFound),
    }
}
