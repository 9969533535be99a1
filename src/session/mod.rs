//! Device session: one open handle binding the state machine, the slot
//! pools and the listener registries to a driver binding.
//!
//! Caller-side operations live on [`CameraHal`], which is the whole surface a
//! framework sees. Frames and hardware events enter through a
//! [`StreamProducer`] owned by the driver's capture context.

pub mod control;
pub mod message;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::device::{DeviceBinding, DeviceInfo, StreamKind, DEVICE_COUNT_MAX};
use crate::capture::format::StreamFormat;
use crate::capture::frame::{FrameBuffer, FrameMetadata};
use crate::error::{CameraError, Result};
use crate::pipeline::{BufferPool, CallbackRegistry, ListenerId, PoolStats};
use crate::{HalConfig, CONFIG};

use control::{BatchCommand, Command, ControlValue, Controls};
use message::Message;
use state::{FocusState, Operation, SessionState};

/// Preview and video frame listener
pub type FrameCallback = dyn Fn(&FrameBuffer, &FrameMetadata) + Send + Sync;

/// Still capture listener: main image, optional postview and thumbnail
pub type CaptureCallback =
    dyn Fn(&FrameBuffer, Option<&FrameBuffer>, Option<&FrameBuffer>) + Send + Sync;

pub type MessageCallback = dyn Fn(&Message) + Send + Sync;

/// Rejected batch: the first field the device refused, and why
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("batch command rejected at {command:?}: {error}")]
pub struct BatchError {
    pub command: Command,
    pub error: CameraError,
}

impl From<BatchError> for CameraError {
    fn from(err: BatchError) -> Self {
        err.error
    }
}

/// Fixed-shape operation table a framework binds to
pub trait CameraHal {
    fn get_device_list(&self) -> Result<Vec<DeviceInfo>>;
    fn open_device(&self, index: u32) -> Result<()>;
    fn close_device(&self) -> Result<()>;

    fn add_message_callback(&self, callback: Arc<MessageCallback>) -> Result<ListenerId>;
    fn remove_message_callback(&self, id: ListenerId) -> Result<()>;

    fn set_preview_stream_format(&self, format: &StreamFormat) -> Result<()>;
    fn get_preview_stream_format(&self) -> Result<StreamFormat>;
    fn start_preview(&self, callback: Arc<FrameCallback>) -> Result<()>;
    fn release_preview_buffer(&self, index: usize) -> Result<()>;
    fn stop_preview(&self) -> Result<()>;

    fn start_auto_focus(&self) -> Result<()>;
    fn stop_auto_focus(&self) -> Result<()>;

    fn start_capture(&self, callback: Arc<CaptureCallback>) -> Result<()>;
    fn stop_capture(&self) -> Result<()>;

    fn set_video_stream_format(&self, format: &StreamFormat) -> Result<()>;
    fn get_video_stream_format(&self) -> Result<StreamFormat>;
    fn start_record(&self, callback: Arc<FrameCallback>) -> Result<()>;
    fn release_video_buffer(&self, index: usize) -> Result<()>;
    fn stop_record(&self) -> Result<()>;

    fn set_command(&self, command: Command, value: ControlValue) -> Result<()>;
    fn get_command(&self, command: Command) -> Result<ControlValue>;
    fn set_batch_command(&self, batch: &BatchCommand) -> std::result::Result<(), BatchError>;
}

/// Open/closed flag for one stream.
///
/// Deliveries hold the read side for their whole fan-out, so taking the
/// write side waits them out.
struct Gate(RwLock<bool>);

impl Gate {
    fn new() -> Self {
        Self(RwLock::new(false))
    }

    fn set(&self, open: bool) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = open;
    }

    fn enter(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let guard = self.0.read().unwrap_or_else(|e| e.into_inner());
        if *guard {
            Some(guard)
        } else {
            None
        }
    }

    fn is_open(&self) -> bool {
        self.enter().is_some()
    }
}

struct Pools([BufferPool; 3]);

impl Pools {
    fn new(config: &HalConfig) -> Result<Self> {
        Ok(Self([
            BufferPool::new(StreamKind::Preview, config.preview_buffers)?,
            BufferPool::new(StreamKind::Video, config.video_buffers)?,
            BufferPool::new(StreamKind::Capture, config.capture_buffers)?,
        ]))
    }

    fn get(&self, stream: StreamKind) -> &BufferPool {
        &self.0[stream.slot()]
    }
}

struct Inner {
    state: SessionState,
    device: Option<DeviceInfo>,
    preview_format: StreamFormat,
    video_format: StreamFormat,
    focus: FocusState,
    controls: Controls,
    esd_fault: bool,
    /// Non-ZSL capture stopped the preview stream
    preview_paused: bool,
    stream_listener: [Option<ListenerId>; 3],
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Initialized,
            device: None,
            preview_format: StreamFormat::default(),
            video_format: StreamFormat::default(),
            focus: FocusState::Released,
            controls: Controls::default(),
            esd_fault: false,
            preview_paused: false,
            stream_listener: [None; 3],
        }
    }
}

/// State shared between the caller side and the producer side
struct Core {
    inner: Mutex<Inner>,
    pools: ArcSwapOption<Pools>,
    gates: [Gate; 3],
    frame_listeners: [CallbackRegistry<FrameCallback>; 2],
    capture_listeners: CallbackRegistry<CaptureCallback>,
    message_listeners: CallbackRegistry<MessageCallback>,
}

impl Core {
    fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
        Ok(self.inner.lock()?)
    }

    fn gate(&self, stream: StreamKind) -> &Gate {
        &self.gates[stream.slot()]
    }

    fn frame_listeners(&self, stream: StreamKind) -> Result<&CallbackRegistry<FrameCallback>> {
        match stream {
            StreamKind::Preview => Ok(&self.frame_listeners[0]),
            StreamKind::Video => Ok(&self.frame_listeners[1]),
            StreamKind::Capture => Err(CameraError::InvalidParameter),
        }
    }

    fn pools(&self) -> Result<Arc<Pools>> {
        self.pools.load_full().ok_or(CameraError::InvalidState)
    }

    fn dispatch_message(&self, message: &Message) {
        metrics::counter!("camhal_messages_posted", "kind" => message.kind()).increment(1);
        for listener in self.message_listeners.snapshot().iter() {
            (listener.callback)(message);
        }
    }
}

/// One open handle on a camera device
pub struct DeviceSession<B: DeviceBinding> {
    binding: B,
    config: HalConfig,
    /// Serializes check-and-set of the state machine
    lifecycle: Mutex<()>,
    /// Serializes control writers. Kept apart from `lifecycle` so frame
    /// callbacks can adjust controls while a stop waits on them.
    controls_op: Mutex<()>,
    core: Arc<Core>,
}

impl<B: DeviceBinding> DeviceSession<B> {
    /// Creates an INITIALIZED session with the global configuration.
    pub fn init(binding: B) -> Result<Self> {
        let config = CONFIG.load().hal.clone();
        Self::with_config(binding, config)
    }

    pub fn with_config(binding: B, config: HalConfig) -> Result<Self> {
        config.validate()?;
        let core = Core {
            inner: Mutex::new(Inner::new()),
            pools: ArcSwapOption::empty(),
            gates: [Gate::new(), Gate::new(), Gate::new()],
            frame_listeners: [CallbackRegistry::new(), CallbackRegistry::new()],
            capture_listeners: CallbackRegistry::new(),
            message_listeners: CallbackRegistry::new(),
        };
        debug!(?config, "camera session initialized");
        Ok(Self {
            binding,
            config,
            lifecycle: Mutex::new(()),
            controls_op: Mutex::new(()),
            core: Arc::new(core),
        })
    }

    /// Tears the handle down, closing the device first if still open.
    pub fn deinit(self) -> Result<()> {
        if self.state()? != SessionState::Initialized {
            self.close_device()?;
        }
        info!("camera session deinitialized");
        Ok(())
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn config(&self) -> &HalConfig {
        &self.config
    }

    pub fn state(&self) -> Result<SessionState> {
        Ok(self.core.inner()?.state)
    }

    pub fn focus_state(&self) -> Result<FocusState> {
        Ok(self.core.inner()?.focus)
    }

    pub fn device(&self) -> Result<Option<DeviceInfo>> {
        Ok(self.core.inner()?.device.clone())
    }

    pub fn pool_stats(&self, stream: StreamKind) -> Option<PoolStats> {
        self.core.pools.load().as_ref().map(|p| p.get(stream).stats())
    }

    /// Handle for the driver's capture context.
    pub fn producer(&self) -> StreamProducer {
        StreamProducer {
            core: Arc::clone(&self.core),
        }
    }

    /// Adds a frame listener to the preview or video stream.
    pub fn add_frame_listener(
        &self,
        stream: StreamKind,
        callback: Arc<FrameCallback>,
    ) -> Result<ListenerId> {
        self.core.frame_listeners(stream)?.add(callback)
    }

    pub fn remove_frame_listener(&self, stream: StreamKind, id: ListenerId) -> Result<()> {
        self.core.frame_listeners(stream)?.remove(id)
    }

    fn check_not_faulted(inner: &Inner) -> Result<()> {
        if inner.esd_fault {
            warn!("start rejected after ESD fault, reopen the device");
            return Err(CameraError::DeviceEsd);
        }
        Ok(())
    }

    fn require_opened(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.core.inner()?;
        if inner.state == SessionState::Initialized {
            return Err(CameraError::InvalidState);
        }
        Ok(inner)
    }

    /// Starts a stream in the driver and opens its gate.
    fn begin_stream(
        &self,
        stream: StreamKind,
        format: &StreamFormat,
        callback: Option<Arc<FrameCallback>>,
    ) -> Result<Option<ListenerId>> {
        self.binding.start_stream(stream, format)?;
        let id = match callback {
            Some(cb) => match self.core.frame_listeners(stream)?.add(cb) {
                Ok(id) => Some(id),
                Err(e) => {
                    let _ = self.binding.stop_stream(stream);
                    return Err(e);
                }
            },
            None => None,
        };
        self.core.gate(stream).set(true);
        Ok(id)
    }

    /// Closes a stream's gate, waiting out in-flight deliveries, then stops
    /// the driver stream. Driver failures here are logged, not returned.
    fn end_stream(&self, stream: StreamKind, listener: Option<ListenerId>) {
        self.core.gate(stream).set(false);
        if let Err(e) = self.binding.stop_stream(stream) {
            warn!(stream = stream.as_str(), "driver failed to stop stream: {e}");
        }
        if let Some(id) = listener {
            if let Ok(registry) = self.core.frame_listeners(stream) {
                let _ = registry.remove(id);
            }
        }
    }

    fn set_stream_format(&self, stream: StreamKind, format: &StreamFormat) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let mut inner = self.core.inner()?;
        if inner.state != SessionState::Opened {
            return Err(CameraError::InvalidState);
        }
        format.validate()?;
        let device = inner.device.as_ref().ok_or(CameraError::Internal)?;
        let supported = match stream {
            StreamKind::Video => device.supports_video(format),
            _ => device.supports_preview(format),
        };
        if !supported {
            debug!(stream = stream.as_str(), ?format, "format not supported by device");
            return Err(CameraError::DeviceNotSupported);
        }
        match stream {
            StreamKind::Video => inner.video_format = *format,
            _ => inner.preview_format = *format,
        }
        info!(stream = stream.as_str(), ?format, "stream format set");
        Ok(())
    }

    fn release_buffer(&self, stream: StreamKind, index: usize) -> Result<()> {
        let pools = self.core.pools()?;
        pools.get(stream).release(index)
    }

    /// Stops whatever is running, in reverse order of how it was started,
    /// and leaves the session OPENED.
    fn force_stop(&self) -> Result<()> {
        let (state, paused, preview_id, video_id) = {
            let mut inner = self.core.inner()?;
            (
                inner.state,
                inner.preview_paused,
                inner.stream_listener[StreamKind::Preview.slot()].take(),
                inner.stream_listener[StreamKind::Video.slot()].take(),
            )
        };

        if matches!(state, SessionState::Capturing | SessionState::RecordingSnapshot) {
            self.end_stream(StreamKind::Capture, None);
            self.core.capture_listeners.clear();
        }
        if matches!(state, SessionState::Recording | SessionState::RecordingSnapshot) {
            self.end_stream(StreamKind::Video, video_id);
        }
        if state.is_streaming() {
            if paused {
                // preview was already stopped for the capture
                if let Some(id) = preview_id {
                    let _ = self.core.frame_listeners[0].remove(id);
                }
            } else {
                self.end_stream(StreamKind::Preview, preview_id);
            }
        }

        let mut inner = self.core.inner()?;
        inner.preview_paused = false;
        inner.state = SessionState::Opened;
        Ok(())
    }
}

impl<B: DeviceBinding> CameraHal for DeviceSession<B> {
    fn get_device_list(&self) -> Result<Vec<DeviceInfo>> {
        let devices = self.binding.devices()?;
        if devices.len() > DEVICE_COUNT_MAX {
            error!(count = devices.len(), "driver reported too many devices");
            return Err(CameraError::Internal);
        }
        for device in &devices {
            device.validate()?;
        }
        Ok(devices)
    }

    #[instrument(skip(self))]
    fn open_device(&self, index: u32) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let state = self.core.inner()?.state;
        let next = Operation::OpenDevice.apply(state)?;

        let device = self
            .get_device_list()?
            .into_iter()
            .find(|d| d.index == index)
            .ok_or(CameraError::DeviceNotFound)?;
        let pools = Pools::new(&self.config)?;
        self.binding.open(index)?;

        let pixel = device.formats.first().copied();
        let preview_res = device.preview_resolutions.first().copied();
        let video_res = device.video_resolutions.first().copied();

        let mut inner = self.core.inner()?;
        *inner = Inner::new();
        if let (Some(fmt), Some(res)) = (pixel, preview_res) {
            inner.preview_format = StreamFormat::new(fmt, res, 30);
        }
        if let (Some(fmt), Some(res)) = (pixel, video_res) {
            inner.video_format = StreamFormat::new(fmt, res, 30);
        }
        info!(index, name = %device.name, "camera device opened");
        inner.device = Some(device);
        inner.state = next;
        self.core.pools.store(Some(Arc::new(pools)));
        Ok(())
    }

    #[instrument(skip(self))]
    fn close_device(&self) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let state = self.core.inner()?.state;
        if state == SessionState::Initialized {
            return Err(CameraError::InvalidState);
        }
        if state.is_streaming() {
            warn!(%state, "closing while streaming, forcing stop");
            self.force_stop()?;
        }
        let next = Operation::CloseDevice.apply(SessionState::Opened)?;

        let result = self.binding.close();
        if let Err(e) = &result {
            error!("driver failed to close device: {e}");
        }
        let mut inner = self.core.inner()?;
        *inner = Inner::new();
        inner.state = next;
        self.core.pools.store(None);
        info!("camera device closed");
        result
    }

    fn add_message_callback(&self, callback: Arc<MessageCallback>) -> Result<ListenerId> {
        self.core.message_listeners.add(callback)
    }

    fn remove_message_callback(&self, id: ListenerId) -> Result<()> {
        self.core.message_listeners.remove(id)
    }

    fn set_preview_stream_format(&self, format: &StreamFormat) -> Result<()> {
        self.set_stream_format(StreamKind::Preview, format)
    }

    fn get_preview_stream_format(&self) -> Result<StreamFormat> {
        Ok(self.require_opened()?.preview_format)
    }

    #[instrument(skip(self, callback))]
    fn start_preview(&self, callback: Arc<FrameCallback>) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let (next, format) = {
            let inner = self.core.inner()?;
            let next = Operation::StartPreview.apply(inner.state)?;
            Self::check_not_faulted(&inner)?;
            (next, inner.preview_format)
        };

        let id = self.begin_stream(StreamKind::Preview, &format, Some(callback))?;

        let mut inner = self.core.inner()?;
        inner.stream_listener[StreamKind::Preview.slot()] = id;
        inner.state = next;
        info!(?format, "preview started");
        Ok(())
    }

    fn release_preview_buffer(&self, index: usize) -> Result<()> {
        self.release_buffer(StreamKind::Preview, index)
    }

    #[instrument(skip(self))]
    fn stop_preview(&self) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let (next, id) = {
            let mut inner = self.core.inner()?;
            let next = Operation::StopPreview.apply(inner.state)?;
            (next, inner.stream_listener[StreamKind::Preview.slot()].take())
        };

        // inner is unlocked here so running callbacks can still query the session
        self.end_stream(StreamKind::Preview, id);

        self.core.inner()?.state = next;
        info!("preview stopped");
        Ok(())
    }

    fn start_auto_focus(&self) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        // ONGOING goes in first so an outcome the driver posts from inside
        // the call below is not overwritten
        let previous = {
            let mut inner = self.core.inner()?;
            Operation::StartAutoFocus.apply(inner.state)?;
            Self::check_not_faulted(&inner)?;
            std::mem::replace(&mut inner.focus, FocusState::Ongoing)
        };
        if let Err(e) = self.binding.start_auto_focus() {
            let mut inner = self.core.inner()?;
            if inner.focus == FocusState::Ongoing {
                inner.focus = previous;
            }
            return Err(e);
        }
        debug!("auto focus started");
        Ok(())
    }

    fn stop_auto_focus(&self) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        Operation::StopAutoFocus.apply(self.core.inner()?.state)?;
        self.binding.stop_auto_focus()?;
        debug!("auto focus stop requested");
        Ok(())
    }

    #[instrument(skip(self, callback))]
    fn start_capture(&self, callback: Arc<CaptureCallback>) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let (from, next, preview_format) = {
            let inner = self.core.inner()?;
            let next = Operation::StartCapture.apply(inner.state)?;
            Self::check_not_faulted(&inner)?;
            (inner.state, next, inner.preview_format)
        };

        let id = self.core.capture_listeners.add(callback)?;

        let pause_preview = !self.config.zero_shutter_lag && from == SessionState::Previewing;
        if pause_preview {
            self.core.gate(StreamKind::Preview).set(false);
            if let Err(e) = self.binding.stop_stream(StreamKind::Preview) {
                self.core.gate(StreamKind::Preview).set(true);
                let _ = self.core.capture_listeners.remove(id);
                return Err(e);
            }
        }

        let mut capture_format = preview_format;
        capture_format.format = preview_format.capture_format;
        capture_format.resolution = preview_format.capture_resolution;
        if let Err(e) = self.begin_stream(StreamKind::Capture, &capture_format, None) {
            let _ = self.core.capture_listeners.remove(id);
            if pause_preview {
                match self.binding.start_stream(StreamKind::Preview, &preview_format) {
                    Ok(()) => self.core.gate(StreamKind::Preview).set(true),
                    Err(e) => error!("failed to resume preview after capture error: {e}"),
                }
            }
            return Err(e);
        }

        let mut inner = self.core.inner()?;
        inner.preview_paused = pause_preview;
        inner.state = next;
        info!(zsl = self.config.zero_shutter_lag, "capture started");
        Ok(())
    }

    #[instrument(skip(self))]
    fn stop_capture(&self) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let (next, paused, preview_format) = {
            let inner = self.core.inner()?;
            let next = Operation::StopCapture.apply(inner.state)?;
            (next, inner.preview_paused, inner.preview_format)
        };

        self.end_stream(StreamKind::Capture, None);
        self.core.capture_listeners.clear();

        if paused {
            if let Err(e) = self.binding.start_stream(StreamKind::Preview, &preview_format) {
                error!("failed to restart preview after capture: {e}");
                let mut inner = self.core.inner()?;
                if let Some(id) = inner.stream_listener[StreamKind::Preview.slot()].take() {
                    let _ = self.core.frame_listeners[0].remove(id);
                }
                inner.preview_paused = false;
                inner.state = SessionState::Opened;
                return Err(e);
            }
            self.core.gate(StreamKind::Preview).set(true);
        }

        let mut inner = self.core.inner()?;
        inner.preview_paused = false;
        inner.state = next;
        info!("capture stopped");
        Ok(())
    }

    fn set_video_stream_format(&self, format: &StreamFormat) -> Result<()> {
        self.set_stream_format(StreamKind::Video, format)
    }

    fn get_video_stream_format(&self) -> Result<StreamFormat> {
        Ok(self.require_opened()?.video_format)
    }

    #[instrument(skip(self, callback))]
    fn start_record(&self, callback: Arc<FrameCallback>) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let (next, format) = {
            let inner = self.core.inner()?;
            let next = Operation::StartRecord.apply(inner.state)?;
            Self::check_not_faulted(&inner)?;
            (next, inner.video_format)
        };

        let id = self.begin_stream(StreamKind::Video, &format, Some(callback))?;

        let mut inner = self.core.inner()?;
        inner.stream_listener[StreamKind::Video.slot()] = id;
        inner.state = next;
        info!(?format, "recording started");
        Ok(())
    }

    fn release_video_buffer(&self, index: usize) -> Result<()> {
        self.release_buffer(StreamKind::Video, index)
    }

    #[instrument(skip(self))]
    fn stop_record(&self) -> Result<()> {
        let _op = self.lifecycle.lock()?;
        let (next, id) = {
            let mut inner = self.core.inner()?;
            let next = Operation::StopRecord.apply(inner.state)?;
            (next, inner.stream_listener[StreamKind::Video.slot()].take())
        };

        self.end_stream(StreamKind::Video, id);

        self.core.inner()?.state = next;
        info!("recording stopped");
        Ok(())
    }

    fn set_command(&self, command: Command, value: ControlValue) -> Result<()> {
        let _op = self.controls_op.lock()?;
        let state = self.require_opened()?.state;
        if !command.is_single() || value.command() != command {
            return Err(CameraError::InvalidParameter);
        }
        check_command_state(command, state)?;

        self.binding.apply_control(&value)?;
        // the device may have been closed meanwhile
        self.require_opened()?.controls.set(value);
        debug!(?value, "command applied");
        Ok(())
    }

    fn get_command(&self, command: Command) -> Result<ControlValue> {
        self.require_opened()?.controls.get(command)
    }

    fn set_batch_command(&self, batch: &BatchCommand) -> std::result::Result<(), BatchError> {
        let reject = |command, error| BatchError { command, error };

        let _op = self
            .controls_op
            .lock()
            .map_err(|_| reject(Command::empty(), CameraError::Internal))?;
        let (state, mut staged) = {
            let inner = self
                .require_opened()
                .map_err(|e| reject(Command::empty(), e))?;
            (inner.state, inner.controls)
        };

        let unknown = batch.flags.bits() & !Command::all().bits();
        if unknown != 0 {
            return Err(reject(
                Command::from_bits_retain(unknown),
                CameraError::InvalidParameter,
            ));
        }

        // fields pushed before a failure stay applied, there is no rollback
        let mut failure = None;
        for value in batch.entries() {
            let command = value.command();
            let applied = check_command_state(command, state)
                .and_then(|()| self.binding.apply_control(&value));
            if let Err(error) = applied {
                warn!(?command, "batch command rejected: {error}");
                failure = Some(reject(command, error));
                break;
            }
            staged.set(value);
        }

        // published in one step so a get never sees half a batch
        match self.require_opened() {
            Ok(mut inner) => inner.controls = staged,
            Err(e) => return Err(reject(Command::empty(), e)),
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn check_command_state(command: Command, state: SessionState) -> Result<()> {
    if command == Command::RECORDING_HINT && state != SessionState::Opened {
        return Err(CameraError::InvalidOperation);
    }
    Ok(())
}

impl<B: DeviceBinding> Drop for DeviceSession<B> {
    fn drop(&mut self) {
        let open = self
            .core
            .inner
            .lock()
            .map(|inner| inner.state != SessionState::Initialized)
            .unwrap_or(false);
        if open {
            let _ = self.close_device();
        }
    }
}

/// Producer-side handle used by the driver's capture context.
///
/// Cloning is cheap; every clone addresses the same session.
#[derive(Clone)]
pub struct StreamProducer {
    core: Arc<Core>,
}

impl StreamProducer {
    /// Takes a free slot for `stream`, described with the stream's current
    /// format. `None` if the stream is not running or every slot is busy.
    pub fn acquire(&self, stream: StreamKind) -> Option<FrameBuffer> {
        if !self.core.gate(stream).is_open() {
            return None;
        }
        let (format, resolution) = {
            let inner = self.core.inner().ok()?;
            match stream {
                StreamKind::Preview => {
                    (inner.preview_format.format, inner.preview_format.resolution)
                }
                StreamKind::Video => (inner.video_format.format, inner.video_format.resolution),
                StreamKind::Capture => (
                    inner.preview_format.capture_format,
                    inner.preview_format.capture_resolution,
                ),
            }
        };
        let pools = self.core.pools().ok()?;
        pools.get(stream).acquire(format, resolution)
    }

    /// Returns an acquired slot without delivering it.
    pub fn discard(&self, stream: StreamKind, index: usize) -> Result<()> {
        self.core.pools()?.get(stream).discard(index)
    }

    /// Hands a filled preview or video buffer to every frame listener of the
    /// stream, in registration order, on the calling thread.
    ///
    /// The slot stays in flight until the framework releases it. Fails with
    /// `InvalidState` once the stream has been stopped; the slot is then
    /// returned to the pool.
    pub fn deliver(
        &self,
        stream: StreamKind,
        buffer: FrameBuffer,
        metadata: &FrameMetadata,
    ) -> Result<()> {
        let registry = self.core.frame_listeners(stream)?;
        let pools = self.core.pools()?;
        let pool = pools.get(stream);

        if let Err(e) = buffer.validate() {
            let _ = pool.discard(buffer.index);
            return Err(e);
        }
        let Some(_gate) = self.core.gate(stream).enter() else {
            let _ = pool.discard(buffer.index);
            return Err(CameraError::InvalidState);
        };

        let listeners = registry.snapshot();
        if listeners.is_empty() {
            pool.discard(buffer.index)?;
            return Ok(());
        }
        pool.mark_in_flight(buffer.index)?;

        let started = Instant::now();
        for listener in listeners.iter() {
            (listener.callback)(&buffer, metadata);
        }
        metrics::counter!("camhal_frames_delivered", "stream" => stream.as_str()).increment(1);
        metrics::histogram!("camhal_delivery_time_us").record(started.elapsed().as_micros() as f64);
        Ok(())
    }

    /// Delivers a still capture. Capture slots belong to the listener only for
    /// the duration of the call and are freed afterwards; a `Captured`
    /// message follows.
    pub fn deliver_capture(
        &self,
        main: FrameBuffer,
        postview: Option<FrameBuffer>,
        thumbnail: Option<FrameBuffer>,
    ) -> Result<()> {
        let pools = self.core.pools()?;
        let pool = pools.get(StreamKind::Capture);
        let indices: Vec<usize> = std::iter::once(main.index)
            .chain(postview.iter().map(|b| b.index))
            .chain(thumbnail.iter().map(|b| b.index))
            .collect();
        let discard_all = || {
            for index in &indices {
                if pool.discard(*index).is_err() {
                    let _ = pool.release(*index);
                }
            }
        };

        let valid = main.validate().and_then(|()| {
            postview
                .iter()
                .chain(thumbnail.iter())
                .try_for_each(FrameBuffer::validate)
        });
        if let Err(e) = valid {
            discard_all();
            return Err(e);
        }
        let Some(gate) = self.core.gate(StreamKind::Capture).enter() else {
            discard_all();
            return Err(CameraError::InvalidState);
        };

        for index in &indices {
            if let Err(e) = pool.mark_in_flight(*index) {
                discard_all();
                return Err(e);
            }
        }
        for listener in self.core.capture_listeners.snapshot().iter() {
            (listener.callback)(&main, postview.as_ref(), thumbnail.as_ref());
        }
        for index in &indices {
            pool.release(*index)?;
        }
        metrics::counter!("camhal_frames_delivered", "stream" => "capture").increment(1);
        drop(gate);

        self.post_message(Message::Captured(main));
        Ok(())
    }

    /// Reports a hardware event to every message listener.
    pub fn post_message(&self, message: Message) {
        match &message {
            Message::FocusChanged(next) => {
                if let Ok(mut inner) = self.core.inner() {
                    if !inner.focus.can_become(*next) {
                        warn!(from = ?inner.focus, to = ?next, "unexpected focus transition");
                    }
                    inner.focus = *next;
                }
            }
            Message::Error(err) => {
                error!("device reported error: {err}");
                if message.is_fatal() {
                    if let Ok(mut inner) = self.core.inner() {
                        inner.esd_fault = true;
                    }
                }
            }
            Message::Captured(_) | Message::CaptureData(_) | Message::HdrProgress(_) => {}
        }
        self.core.dispatch_message(&message);
    }

    pub fn is_streaming(&self, stream: StreamKind) -> bool {
        self.core.gate(stream).is_open()
    }
}
