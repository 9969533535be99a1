//! Integration tests for single and batch device parameters.

use std::sync::Arc;

use camhal::capture::format::Rotation;
use camhal::capture::{FrameBuffer, FrameMetadata, VirtualCamera};
use camhal::session::control::{
    BatchCommand, Command, ControlValue, Effect, FocusMode, WhiteBalance,
};
use camhal::session::BatchError;
use camhal::{CameraError, CameraHal, DeviceSession, HalConfig};

fn opened() -> DeviceSession<VirtualCamera> {
    let s = DeviceSession::with_config(VirtualCamera::with_default_devices(), HalConfig::default())
        .expect("Failed to create session");
    s.open_device(0).expect("Failed to open device");
    s
}

fn start_preview(s: &DeviceSession<VirtualCamera>) {
    s.start_preview(Arc::new(|_: &FrameBuffer, _: &FrameMetadata| {}))
        .unwrap();
}

#[test]
fn test_commands_need_open_device() {
    let s = DeviceSession::with_config(VirtualCamera::with_default_devices(), HalConfig::default())
        .unwrap();
    assert_eq!(
        s.set_command(Command::ISO, ControlValue::Iso(100)),
        Err(CameraError::InvalidState)
    );
    assert_eq!(s.get_command(Command::ISO), Err(CameraError::InvalidState));
}

#[test]
fn test_set_then_get() {
    let s = opened();
    s.set_command(Command::ISO, ControlValue::Iso(800)).unwrap();
    s.set_command(Command::ROTATION, ControlValue::Rotation(Rotation::Rotate90))
        .unwrap();
    assert_eq!(s.get_command(Command::ISO), Ok(ControlValue::Iso(800)));
    assert_eq!(
        s.get_command(Command::ROTATION),
        Ok(ControlValue::Rotation(Rotation::Rotate90))
    );
    assert_eq!(
        s.get_command(Command::FOCUS_MODE),
        Ok(ControlValue::FocusMode(FocusMode::Auto))
    );

    // allowed while streaming too
    start_preview(&s);
    s.set_command(Command::CONTRAST, ControlValue::Contrast(4))
        .unwrap();
    assert_eq!(s.get_command(Command::CONTRAST), Ok(ControlValue::Contrast(4)));
}

#[test]
fn test_mismatched_or_multi_bit_commands() {
    let s = opened();
    assert_eq!(
        s.set_command(Command::ISO, ControlValue::Contrast(1)),
        Err(CameraError::InvalidParameter)
    );
    assert_eq!(
        s.set_command(Command::ISO | Command::CONTRAST, ControlValue::Iso(1)),
        Err(CameraError::InvalidParameter)
    );
    assert_eq!(
        s.get_command(Command::empty()),
        Err(CameraError::InvalidParameter)
    );
    assert!(s.binding().applied().is_empty());
}

#[test]
fn test_device_refusal_keeps_old_value() {
    let s = opened();
    s.binding().reject(Command::EFFECT);
    assert_eq!(
        s.set_command(Command::EFFECT, ControlValue::Effect(Effect::Sepia)),
        Err(CameraError::DeviceNotSupported)
    );
    assert_eq!(
        s.get_command(Command::EFFECT),
        Ok(ControlValue::Effect(Effect::None))
    );
}

#[test]
fn test_recording_hint_only_when_opened() {
    let s = opened();
    s.set_command(Command::RECORDING_HINT, ControlValue::RecordingHint(true))
        .unwrap();

    start_preview(&s);
    assert_eq!(
        s.set_command(Command::RECORDING_HINT, ControlValue::RecordingHint(false)),
        Err(CameraError::InvalidOperation)
    );
    let batch = BatchCommand::new().with(ControlValue::RecordingHint(false));
    assert_eq!(
        s.set_batch_command(&batch),
        Err(BatchError {
            command: Command::RECORDING_HINT,
            error: CameraError::InvalidOperation,
        })
    );
    assert_eq!(
        s.get_command(Command::RECORDING_HINT),
        Ok(ControlValue::RecordingHint(true))
    );
}

#[test]
fn test_batch_applies_all_fields() {
    let s = opened();
    let batch = BatchCommand::new()
        .with(ControlValue::DigitalZoom(3))
        .with(ControlValue::WhiteBalance(WhiteBalance::Cloudy))
        .with(ControlValue::Saturation(-2));
    s.set_batch_command(&batch).unwrap();

    assert_eq!(
        s.binding().applied(),
        vec![
            ControlValue::WhiteBalance(WhiteBalance::Cloudy),
            ControlValue::Saturation(-2),
            ControlValue::DigitalZoom(3),
        ]
    );
    assert_eq!(
        s.get_command(Command::DIGITAL_ZOOM),
        Ok(ControlValue::DigitalZoom(3))
    );
}

#[test]
fn test_batch_stops_at_first_refused_field() {
    let s = opened();
    s.binding().reject(Command::EFFECT);
    let batch = BatchCommand::new()
        .with(ControlValue::WhiteBalance(WhiteBalance::Shade))
        .with(ControlValue::Iso(400))
        .with(ControlValue::Effect(Effect::Sepia))
        .with(ControlValue::Exposure(2));

    let err = s.set_batch_command(&batch).unwrap_err();
    assert_eq!(err.command, Command::EFFECT);
    assert_eq!(err.error, CameraError::DeviceNotSupported);
    assert_eq!(CameraError::from(err), CameraError::DeviceNotSupported);

    // the fields before the refusal were pushed and are reported as set
    assert_eq!(
        s.get_command(Command::WHITE_BALANCE),
        Ok(ControlValue::WhiteBalance(WhiteBalance::Shade))
    );
    assert_eq!(s.get_command(Command::ISO), Ok(ControlValue::Iso(400)));
    assert_eq!(
        s.get_command(Command::EFFECT),
        Ok(ControlValue::Effect(Effect::None))
    );
    assert_eq!(s.get_command(Command::EXPOSURE), Ok(ControlValue::Exposure(0)));
    assert_eq!(s.binding().applied().len(), 2);
}

#[test]
fn test_batch_with_unknown_bits() {
    let s = opened();
    let mut batch = BatchCommand::new().with(ControlValue::Iso(100));
    batch.flags = Command::from_bits_retain(batch.flags.bits() | 1 << 40);
    let err = s.set_batch_command(&batch).unwrap_err();
    assert_eq!(err.command, Command::from_bits_retain(1 << 40));
    assert_eq!(err.error, CameraError::InvalidParameter);
    assert!(s.binding().applied().is_empty());
}

#[test]
fn test_controls_reset_on_reopen() {
    let s = opened();
    s.set_command(Command::ISO, ControlValue::Iso(1600)).unwrap();
    s.close_device().unwrap();
    s.open_device(0).unwrap();
    assert_eq!(s.get_command(Command::ISO), Ok(ControlValue::Iso(0)));
}
