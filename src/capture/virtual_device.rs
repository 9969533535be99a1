//! Software camera binding.
//!
//! Stands in for a vendor driver: it tracks what the session asked for,
//! can be told to refuse controls or stream starts, and synthesizes frames
//! for a [`StreamProducer`].

use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, info};

use super::device::{DeviceBinding, DeviceInfo, FacingDirection, StreamKind};
use super::format::StreamFormat;
use super::frame::{
    BackingHandle, Fraction, FrameBuffer, FrameMetadata, PixelFormat, Plane, Resolution,
};
use crate::error::{CameraError, Result};
use crate::session::control::{Command, ControlValue};
use crate::session::StreamProducer;

#[derive(Default)]
struct State {
    opened: Option<u32>,
    streaming: [Option<StreamFormat>; 3],
    focusing: bool,
    rejected: Command,
    failing_starts: Vec<StreamKind>,
    applied: Vec<ControlValue>,
}

pub struct VirtualCamera {
    devices: Vec<DeviceInfo>,
    state: Mutex<State>,
}

impl VirtualCamera {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            state: Mutex::new(State::default()),
        }
    }

    /// A rear and a front camera with common YUV modes.
    pub fn with_default_devices() -> Self {
        Self::new(vec![
            DeviceInfo {
                index: 0,
                name: "virtual-rear".into(),
                facing: FacingDirection::Rear,
                formats: vec![
                    PixelFormat::Nv12,
                    PixelFormat::Nv21,
                    PixelFormat::Yuyv,
                    PixelFormat::Jpeg,
                ],
                preview_resolutions: vec![
                    Resolution::new(1920, 1080),
                    Resolution::new(1280, 720),
                    Resolution::new(640, 480),
                ],
                video_resolutions: vec![Resolution::new(1920, 1080), Resolution::new(1280, 720)],
            },
            DeviceInfo {
                index: 1,
                name: "virtual-front".into(),
                facing: FacingDirection::Front,
                formats: vec![PixelFormat::Nv12],
                preview_resolutions: vec![Resolution::new(1280, 720), Resolution::new(640, 480)],
                video_resolutions: vec![Resolution::new(1280, 720)],
            },
        ])
    }

    /// Makes `apply_control` refuse `command` with `DeviceNotSupported`.
    pub fn reject(&self, command: Command) {
        self.lock().rejected |= command;
    }

    /// Makes the next start of `stream` fail with `DeviceUnavailable`.
    pub fn fail_next_start(&self, stream: StreamKind) {
        self.lock().failing_starts.push(stream);
    }

    pub fn is_open(&self) -> bool {
        self.lock().opened.is_some()
    }

    pub fn is_streaming(&self, stream: StreamKind) -> bool {
        self.lock().streaming[stream.slot()].is_some()
    }

    /// Format the stream was last started with, while it runs.
    pub fn stream_format(&self, stream: StreamKind) -> Option<StreamFormat> {
        self.lock().streaming[stream.slot()]
    }

    pub fn is_focusing(&self) -> bool {
        self.lock().focusing
    }

    /// Every control pushed so far, in order.
    pub fn applied(&self) -> Vec<ControlValue> {
        self.lock().applied.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeviceBinding for VirtualCamera {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn open(&self, index: u32) -> Result<()> {
        let mut state = self.lock();
        if state.opened.is_some() {
            return Err(CameraError::DeviceUnavailable);
        }
        if !self.devices.iter().any(|d| d.index == index) {
            return Err(CameraError::DeviceNotFound);
        }
        state.opened = Some(index);
        info!(index, "virtual camera opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if state.opened.is_none() {
            return Err(CameraError::InvalidState);
        }
        *state = State {
            rejected: state.rejected,
            ..State::default()
        };
        info!("virtual camera closed");
        Ok(())
    }

    fn start_stream(&self, stream: StreamKind, format: &StreamFormat) -> Result<()> {
        let mut state = self.lock();
        if state.opened.is_none() || state.streaming[stream.slot()].is_some() {
            return Err(CameraError::InvalidState);
        }
        if let Some(pos) = state.failing_starts.iter().position(|s| *s == stream) {
            state.failing_starts.remove(pos);
            return Err(CameraError::DeviceUnavailable);
        }
        state.streaming[stream.slot()] = Some(*format);
        debug!(stream = stream.as_str(), ?format, "virtual stream on");
        Ok(())
    }

    fn stop_stream(&self, stream: StreamKind) -> Result<()> {
        let mut state = self.lock();
        if state.streaming[stream.slot()].take().is_none() {
            return Err(CameraError::InvalidState);
        }
        debug!(stream = stream.as_str(), "virtual stream off");
        Ok(())
    }

    fn start_auto_focus(&self) -> Result<()> {
        self.lock().focusing = true;
        Ok(())
    }

    fn stop_auto_focus(&self) -> Result<()> {
        self.lock().focusing = false;
        Ok(())
    }

    fn apply_control(&self, value: &ControlValue) -> Result<()> {
        let mut state = self.lock();
        if state.rejected.contains(value.command()) {
            return Err(CameraError::DeviceNotSupported);
        }
        state.applied.push(*value);
        Ok(())
    }
}

/// Lays out planes for the buffer's format and paints them with `seed`.
pub fn fill(buffer: &mut FrameBuffer, seed: u8) -> Result<()> {
    buffer.planes = buffer
        .format
        .plane_layout(buffer.resolution)?
        .into_iter()
        .map(|(align_width, align_height, size)| Plane {
            data: Bytes::from(vec![seed; size as usize]),
            align_width,
            align_height,
            size,
        })
        .collect();
    buffer.backing = (0..buffer.planes.len())
        .map(|plane| BackingHandle(((buffer.index as u64) << 8) | plane as u64))
        .collect();
    Ok(())
}

/// Plausible sensor readouts for frame `sequence`.
pub fn metadata(sequence: u64) -> FrameMetadata {
    FrameMetadata {
        focal_length: Fraction::new(435, 100),
        aperture_f_number: Fraction::new(18, 10),
        shutter_speed: Fraction::new(1, 30),
        exposure_time: Fraction::new(1, 30),
        brightness: Fraction::new((sequence % 10) as i32, 10),
        iso: 100,
        ..FrameMetadata::default()
    }
}

/// Produces one preview or video frame. `Ok(None)` when the stream is
/// stopped or no slot is free.
pub fn emit_frame(
    producer: &StreamProducer,
    stream: StreamKind,
    sequence: u64,
) -> Result<Option<usize>> {
    let Some(mut buffer) = producer.acquire(stream) else {
        return Ok(None);
    };
    let index = buffer.index;
    if let Err(e) = fill(&mut buffer, sequence as u8) {
        producer.discard(stream, index)?;
        return Err(e);
    }
    producer.deliver(stream, buffer, &metadata(sequence))?;
    Ok(Some(index))
}

/// Produces one still capture with a postview when a second slot is free.
pub fn emit_capture(producer: &StreamProducer, sequence: u64) -> Result<Option<usize>> {
    let Some(mut main) = producer.acquire(StreamKind::Capture) else {
        return Ok(None);
    };
    let index = main.index;
    if let Err(e) = fill(&mut main, sequence as u8) {
        producer.discard(StreamKind::Capture, index)?;
        return Err(e);
    }
    let postview = match producer.acquire(StreamKind::Capture) {
        Some(mut b) => {
            if fill(&mut b, sequence as u8).is_ok() {
                Some(b)
            } else {
                producer.discard(StreamKind::Capture, b.index)?;
                None
            }
        }
        None => None,
    };
    producer.deliver_capture(main, postview, None)?;
    Ok(Some(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_open_is_busy() {
        let cam = VirtualCamera::with_default_devices();
        cam.open(0).unwrap();
        assert_eq!(cam.open(1), Err(CameraError::DeviceUnavailable));
        cam.close().unwrap();
        assert!(!cam.is_open());
    }

    #[test]
    fn streams_need_an_open_device() {
        let cam = VirtualCamera::with_default_devices();
        let fmt = StreamFormat::default();
        assert_eq!(
            cam.start_stream(StreamKind::Preview, &fmt),
            Err(CameraError::InvalidState)
        );
        cam.open(0).unwrap();
        cam.start_stream(StreamKind::Preview, &fmt).unwrap();
        assert!(cam.is_streaming(StreamKind::Preview));
        assert_eq!(
            cam.start_stream(StreamKind::Preview, &fmt),
            Err(CameraError::InvalidState)
        );
        cam.stop_stream(StreamKind::Preview).unwrap();
        assert!(!cam.is_streaming(StreamKind::Preview));
    }

    #[test]
    fn injected_start_failure_fires_once() {
        let cam = VirtualCamera::with_default_devices();
        cam.open(0).unwrap();
        cam.fail_next_start(StreamKind::Video);
        let fmt = StreamFormat::default();
        assert_eq!(
            cam.start_stream(StreamKind::Video, &fmt),
            Err(CameraError::DeviceUnavailable)
        );
        assert!(cam.start_stream(StreamKind::Video, &fmt).is_ok());
    }

    #[test]
    fn rejected_controls_are_not_recorded() {
        let cam = VirtualCamera::with_default_devices();
        cam.reject(Command::ISO);
        assert_eq!(
            cam.apply_control(&ControlValue::Iso(800)),
            Err(CameraError::DeviceNotSupported)
        );
        cam.apply_control(&ControlValue::Contrast(3)).unwrap();
        assert_eq!(cam.applied(), vec![ControlValue::Contrast(3)]);
    }

    #[test]
    fn fill_produces_valid_buffer() {
        let mut buf = FrameBuffer::new(2, PixelFormat::I420, Resolution::new(320, 240));
        fill(&mut buf, 7).unwrap();
        assert!(buf.validate().is_ok());
        assert_eq!(buf.planes.len(), 3);
        assert_eq!(buf.backing.len(), 3);
        assert_eq!(buf.total_size(), 320 * 240 * 3 / 2);
        assert_eq!(buf.planes[0].data[0], 7);
    }

    #[test]
    fn fill_refuses_oversized_geometry() {
        let mut buf = FrameBuffer::new(0, PixelFormat::Argb8888, Resolution::new(65536, 65536));
        assert_eq!(fill(&mut buf, 0), Err(CameraError::InvalidParameter));
        assert!(buf.planes.is_empty());
    }
}
