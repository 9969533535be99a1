pub mod device;
pub mod format;
pub mod frame;
pub mod virtual_device;

pub use device::{DeviceBinding, DeviceInfo, FacingDirection, StreamKind};
pub use format::StreamFormat;
pub use frame::{FrameBuffer, FrameMetadata, PixelFormat, Resolution};
pub use virtual_device::VirtualCamera;
