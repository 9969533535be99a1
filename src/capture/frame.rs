use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};

/// Maximum number of planes (and backing objects) per buffer
pub const BUFFER_PLANE_MAX: usize = 4;

/// Pixel formats a stream can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Nv12,
    Nv21,
    I420,
    Yv12,
    Yuyv,
    Uyvy,
    Bgra8888,
    Argb8888,
    Jpeg,
    H264,
}

impl PixelFormat {
    pub fn is_encoded(self) -> bool {
        matches!(self, PixelFormat::Jpeg | PixelFormat::H264)
    }

    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Nv12 | PixelFormat::Nv21 => 2,
            PixelFormat::I420 | PixelFormat::Yv12 => 3,
            _ => 1,
        }
    }

    /// Plane geometry `(align_width, align_height, size)` for a resolution.
    ///
    /// Widths are aligned to 16 and heights to 2. Encoded formats report a
    /// worst-case single plane. Geometry whose byte size does not fit a
    /// `u32` is `InvalidParameter`.
    pub fn plane_layout(self, res: Resolution) -> Result<Vec<(u32, u32, u32)>> {
        let w = align(res.width, 16).ok_or(CameraError::InvalidParameter)?;
        let h = align(res.height, 2).ok_or(CameraError::InvalidParameter)?;
        let luma = w.checked_mul(h).ok_or(CameraError::InvalidParameter)?;
        let scaled = |num: u32, den: u32| {
            luma.checked_mul(num)
                .map(|v| v / den)
                .ok_or(CameraError::InvalidParameter)
        };
        let layout = match self {
            PixelFormat::Nv12 | PixelFormat::Nv21 => vec![(w, h, luma), (w, h / 2, luma / 2)],
            PixelFormat::I420 | PixelFormat::Yv12 => vec![
                (w, h, luma),
                (w / 2, h / 2, luma / 4),
                (w / 2, h / 2, luma / 4),
            ],
            PixelFormat::Yuyv | PixelFormat::Uyvy => vec![(w, h, scaled(2, 1)?)],
            PixelFormat::Bgra8888 | PixelFormat::Argb8888 => vec![(w, h, scaled(4, 1)?)],
            PixelFormat::Jpeg | PixelFormat::H264 => vec![(w, h, scaled(3, 2)?)],
        };
        Ok(layout)
    }
}

fn align(value: u32, to: u32) -> Option<u32> {
    value.div_ceil(to).checked_mul(to)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: i32,
    pub denominator: i32,
}

impl Fraction {
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One image plane. `data` is a shared view into memory owned by the
/// external buffer manager, never copied by the HAL.
#[derive(Debug, Clone, Default)]
pub struct Plane {
    pub data: Bytes,
    pub align_width: u32,
    pub align_height: u32,
    pub size: u32,
}

/// Opaque handle to a native memory object supplied by the buffer manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackingHandle(pub u64);

/// Hardware-backed image descriptor, addressed by its slot `index`
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub index: usize,
    pub format: PixelFormat,
    pub resolution: Resolution,
    pub planes: Vec<Plane>,
    pub backing: Vec<BackingHandle>,
}

impl FrameBuffer {
    pub fn new(index: usize, format: PixelFormat, resolution: Resolution) -> Self {
        Self {
            index,
            format,
            resolution,
            planes: Vec::with_capacity(format.plane_count()),
            backing: Vec::new(),
        }
    }

    /// Checks the plane and backing-object counts a producer filled in.
    pub fn validate(&self) -> Result<()> {
        if self.planes.is_empty() || self.planes.len() > BUFFER_PLANE_MAX {
            return Err(CameraError::InvalidParameter);
        }
        if self.backing.len() > BUFFER_PLANE_MAX {
            return Err(CameraError::InvalidParameter);
        }
        Ok(())
    }

    pub fn total_size(&self) -> u64 {
        self.planes.iter().map(|p| p.size as u64).sum()
    }
}

/// Readouts attached to a delivered frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    pub is_flashed: bool,
    pub focal_length: Fraction,
    pub aperture_f_number: Fraction,
    pub shutter_speed: Fraction,
    pub exposure_time: Fraction,
    pub brightness: Fraction,
    pub exif_image: Resolution,
    pub iso: i32,
    pub metering_mode: i32,
    pub color_space: i32,
    pub component_configuration: i32,
    pub aperture_in_apex: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_layout_has_two_planes() {
        let planes = PixelFormat::Nv12
            .plane_layout(Resolution::new(1920, 1080))
            .unwrap();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0], (1920, 1080, 1920 * 1080));
        assert_eq!(planes[1].2, 1920 * 1080 / 2);
    }

    #[test]
    fn odd_widths_are_aligned() {
        let planes = PixelFormat::Yuyv
            .plane_layout(Resolution::new(641, 479))
            .unwrap();
        assert_eq!(planes[0].0, 656);
        assert_eq!(planes[0].1, 480);
    }

    #[test]
    fn plane_count_matches_layout() {
        for fmt in [
            PixelFormat::Nv12,
            PixelFormat::I420,
            PixelFormat::Uyvy,
            PixelFormat::Argb8888,
            PixelFormat::Jpeg,
        ] {
            assert_eq!(
                fmt.plane_count(),
                fmt.plane_layout(Resolution::new(64, 64)).unwrap().len()
            );
        }
    }

    #[test]
    fn oversized_geometry_is_rejected() {
        let huge = Resolution::new(u32::MAX, u32::MAX);
        assert_eq!(
            PixelFormat::Nv12.plane_layout(huge),
            Err(CameraError::InvalidParameter)
        );
        // luma fits, four bytes per pixel does not
        let wide = Resolution::new(65536, 32768);
        assert!(PixelFormat::Nv12.plane_layout(wide).is_ok());
        assert_eq!(
            PixelFormat::Bgra8888.plane_layout(wide),
            Err(CameraError::InvalidParameter)
        );
    }

    #[test]
    fn buffer_without_planes_is_rejected() {
        let buf = FrameBuffer::new(0, PixelFormat::Nv12, Resolution::new(64, 64));
        assert_eq!(buf.validate(), Err(CameraError::InvalidParameter));
    }

    #[test]
    fn buffer_with_too_many_planes_is_rejected() {
        let mut buf = FrameBuffer::new(0, PixelFormat::Nv12, Resolution::new(64, 64));
        buf.planes = vec![Plane::default(); BUFFER_PLANE_MAX + 1];
        assert_eq!(buf.validate(), Err(CameraError::InvalidParameter));
    }
}
