use super::state::FocusState;
use crate::capture::frame::FrameBuffer;
use crate::error::CameraError;

/// Asynchronous hardware event, fanned out to every message listener
#[derive(Debug, Clone)]
pub enum Message {
    FocusChanged(FocusState),
    /// Still capture finished; carries the main image descriptor
    Captured(FrameBuffer),
    CaptureData(FrameBuffer),
    /// HDR capture progress in percent
    HdrProgress(u32),
    Error(CameraError),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::FocusChanged(_) => "focus_changed",
            Message::Captured(_) => "captured",
            Message::CaptureData(_) => "capture_data",
            Message::HdrProgress(_) => "hdr_progress",
            Message::Error(_) => "error",
        }
    }

    /// An ESD fault ends the usefulness of the open session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Message::Error(CameraError::DeviceEsd))
    }
}
