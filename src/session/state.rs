//! Session state machine and focus sub-state

use std::fmt;

use crate::error::{CameraError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Initialized,
    Opened,
    Previewing,
    Capturing,
    Recording,
    RecordingSnapshot,
}

impl SessionState {
    /// States in which a preview or video stream is producing frames.
    pub fn is_streaming(self) -> bool {
        !matches!(self, SessionState::Initialized | SessionState::Opened)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initialized => "INITIALIZED",
            SessionState::Opened => "OPENED",
            SessionState::Previewing => "PREVIEWING",
            SessionState::Capturing => "CAPTURING",
            SessionState::Recording => "RECORDING",
            SessionState::RecordingSnapshot => "RECORDING_SNAPSHOT",
        };
        f.write_str(name)
    }
}

/// Lifecycle operations guarded by the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    OpenDevice,
    CloseDevice,
    StartPreview,
    StopPreview,
    StartCapture,
    StopCapture,
    StartRecord,
    StopRecord,
    StartAutoFocus,
    StopAutoFocus,
}

impl Operation {
    /// Post-state of `self` applied in `from`, or `InvalidState`.
    pub fn apply(self, from: SessionState) -> Result<SessionState> {
        use Operation::*;
        use SessionState::*;

        let to = match (self, from) {
            (OpenDevice, Initialized) => Opened,
            (CloseDevice, Opened) => Initialized,
            (StartPreview, Opened) => Previewing,
            (StopPreview, Previewing) => Opened,
            (StartCapture, Previewing) => Capturing,
            (StartCapture, Recording) => RecordingSnapshot,
            (StopCapture, Capturing) => Previewing,
            (StopCapture, RecordingSnapshot) => Recording,
            (StartRecord, Previewing) => Recording,
            (StopRecord, Recording) => Previewing,
            (StartAutoFocus | StopAutoFocus, s @ (Previewing | Recording)) => s,
            _ => return Err(CameraError::InvalidState),
        };
        Ok(to)
    }
}

/// Folds a sequence of operations from `start`, stopping at the first
/// rejected one.
pub fn fold(start: SessionState, ops: &[Operation]) -> Result<SessionState> {
    ops.iter().try_fold(start, |state, op| op.apply(state))
}

/// Auto-focus outcome, reported by hardware events only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FocusState {
    #[default]
    Released,
    Ongoing,
    Focused,
    Failed,
}

impl FocusState {
    /// Whether `next` is an expected successor of `self`.
    pub fn can_become(self, next: FocusState) -> bool {
        use FocusState::*;
        matches!(
            (self, next),
            (Released, Ongoing)
                | (Ongoing, Focused)
                | (Ongoing, Failed)
                | (Ongoing, Released)
                | (Focused, Released)
                | (Failed, Released)
                | (Focused, Ongoing)
                | (Failed, Ongoing)
        )
    }
}
