//! Camera HAL demo: drives a virtual camera through preview, focus and
//! still capture

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camhal::capture::virtual_device::{emit_capture, emit_frame};
use camhal::capture::{FrameBuffer, FrameMetadata, Resolution, StreamFormat, StreamKind};
use camhal::capture::VirtualCamera;
use camhal::session::message::Message;
use camhal::session::state::FocusState;
use camhal::{utils, CameraHal, Config, DeviceSession};
use color_eyre::Result;
use flume::bounded;
use tracing::{error, info, warn};

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("camhal=debug,camhal_demo=info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(fmt::time::uptime()));
    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());
    registry.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("camhal demo launching...");

    // Load configuration
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;
    camhal::CONFIG.store(Arc::new(config.clone()));

    let session = Arc::new(DeviceSession::init(VirtualCamera::with_default_devices())?);
    let devices = session.get_device_list()?;
    let device = utils::select_device(&devices, config.capture.facing, config.capture.format)?;
    session.open_device(device.index)?;

    session.add_message_callback(Arc::new(|msg: &Message| {
        info!(kind = msg.kind(), "hardware message");
    }))?;

    let capture = &config.capture;
    let format = StreamFormat::new(
        capture.format,
        Resolution::new(capture.width, capture.height),
        capture.fps,
    );
    session.set_preview_stream_format(&format)?;

    // Set up tx/rx; every slot can be in flight at once, so the channel never fills
    let (tx, rx) = bounded::<usize>(config.hal.preview_buffers);
    session.start_preview(Arc::new(move |buf: &FrameBuffer, _meta: &FrameMetadata| {
        if let Err(e) = tx.try_send(buf.index) {
            warn!("preview consumer lagging: {e}");
        }
    }))?;

    // Spawn consumer task
    let consumer = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut released = 0u64;
            while let Ok(index) = rx.recv_async().await {
                tokio::time::sleep(Duration::from_millis(2)).await;
                match session.release_preview_buffer(index) {
                    Ok(()) => released += 1,
                    Err(e) => error!(index, "release failed: {e}"),
                }
            }
            released
        })
    };

    let producer = session.producer();
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / capture.fps.max(1) as f64));
    for seq in 0..u64::from(capture.frames) {
        ticker.tick().await;
        match seq {
            10 => session.start_auto_focus()?,
            20 => producer.post_message(Message::FocusChanged(FocusState::Focused)),
            _ => {}
        }
        if let Err(e) = emit_frame(&producer, StreamKind::Preview, seq) {
            warn!(seq, "preview frame lost: {e}");
        }
    }

    session.start_capture(Arc::new(
        |main: &FrameBuffer, postview: Option<&FrameBuffer>, _thumbnail: Option<&FrameBuffer>| {
            info!(
                index = main.index,
                bytes = main.total_size(),
                postview = postview.is_some(),
                "still captured"
            );
        },
    ))?;
    emit_capture(&producer, u64::from(capture.frames))?;
    session.stop_capture()?;
    session.stop_preview()?;

    let released = consumer.await?;
    if let Some(stats) = session.pool_stats(StreamKind::Preview) {
        info!(?stats, released, "preview pool");
    }

    session.close_device()?;
    info!("camhal demo shutting down");
    Ok(())
}
