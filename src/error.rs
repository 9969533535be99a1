//! Error codes returned across the HAL boundary.
//!
//! Every public operation returns `Result<T, CameraError>`. Each variant maps
//! to a stable 32-bit code so a driver binding or an FFI shim can pass it
//! through unchanged.

use thiserror::Error;

/// Convenience alias for HAL results.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Code reported for a successful call.
pub const ERROR_NONE: u32 = 0x0000_0000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraError {
    #[error("invalid parameter")]
    InvalidParameter,

    #[error("operation is not allowed in the current state")]
    InvalidState,

    #[error("access to the device was refused by the platform")]
    PermissionDenied,

    #[error("out of memory")]
    OutOfMemory,

    #[error("device could not be opened")]
    DeviceOpen,

    #[error("device not found")]
    DeviceNotFound,

    #[error("device unavailable")]
    DeviceUnavailable,

    #[error("not supported by the device")]
    DeviceNotSupported,

    #[error("device hit an ESD fault")]
    DeviceEsd,

    #[error("internal driver binding failure")]
    Internal,

    #[error("operation is not meaningful in the current state")]
    InvalidOperation,

    #[error("unknown error")]
    Unknown,
}

impl CameraError {
    pub const fn code(self) -> u32 {
        match self {
            CameraError::InvalidParameter => 0x8000_2001,
            CameraError::InvalidState => 0x8000_2002,
            CameraError::PermissionDenied => 0x8000_2003,
            CameraError::OutOfMemory => 0x8000_2004,
            CameraError::DeviceOpen => 0x8000_2005,
            CameraError::DeviceNotFound => 0x8000_2006,
            CameraError::DeviceUnavailable => 0x8000_2007,
            CameraError::DeviceNotSupported => 0x8000_2008,
            CameraError::DeviceEsd => 0x8000_2009,
            CameraError::Internal => 0x8000_200a,
            CameraError::InvalidOperation => 0x8000_200b,
            CameraError::Unknown => 0x8000_2fff,
        }
    }

    /// Maps a raw code back to an error. Unrecognised codes become `Unknown`.
    pub const fn from_code(code: u32) -> Self {
        match code {
            0x8000_2001 => CameraError::InvalidParameter,
            0x8000_2002 => CameraError::InvalidState,
            0x8000_2003 => CameraError::PermissionDenied,
            0x8000_2004 => CameraError::OutOfMemory,
            0x8000_2005 => CameraError::DeviceOpen,
            0x8000_2006 => CameraError::DeviceNotFound,
            0x8000_2007 => CameraError::DeviceUnavailable,
            0x8000_2008 => CameraError::DeviceNotSupported,
            0x8000_2009 => CameraError::DeviceEsd,
            0x8000_200a => CameraError::Internal,
            0x8000_200b => CameraError::InvalidOperation,
            _ => CameraError::Unknown,
        }
    }

    /// Hardware-layer faults reported by the driver binding.
    pub const fn is_device_fault(self) -> bool {
        matches!(
            self,
            CameraError::DeviceOpen
                | CameraError::DeviceNotFound
                | CameraError::DeviceUnavailable
                | CameraError::DeviceNotSupported
                | CameraError::DeviceEsd
        )
    }
}

/// Flattens a result into the raw code, `ERROR_NONE` on success.
pub fn result_code<T>(result: &Result<T>) -> u32 {
    match result {
        Ok(_) => ERROR_NONE,
        Err(e) => e.code(),
    }
}

impl From<std::collections::TryReserveError> for CameraError {
    fn from(_: std::collections::TryReserveError) -> Self {
        CameraError::OutOfMemory
    }
}

impl<T> From<std::sync::PoisonError<T>> for CameraError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CameraError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_from_code() {
        let all = [
            CameraError::InvalidParameter,
            CameraError::InvalidState,
            CameraError::PermissionDenied,
            CameraError::OutOfMemory,
            CameraError::DeviceOpen,
            CameraError::DeviceNotFound,
            CameraError::DeviceUnavailable,
            CameraError::DeviceNotSupported,
            CameraError::DeviceEsd,
            CameraError::Internal,
            CameraError::InvalidOperation,
            CameraError::Unknown,
        ];
        for err in all {
            assert_eq!(CameraError::from_code(err.code()), err);
        }
    }

    #[test]
    fn unrecognised_code_is_unknown() {
        assert_eq!(CameraError::from_code(0x1234), CameraError::Unknown);
        assert_eq!(CameraError::from_code(ERROR_NONE), CameraError::Unknown);
    }

    #[test]
    fn result_code_flattens() {
        let ok: Result<()> = Ok(());
        let err: Result<()> = Err(CameraError::InvalidState);
        assert_eq!(result_code(&ok), ERROR_NONE);
        assert_eq!(result_code(&err), 0x8000_2002);
    }
}
