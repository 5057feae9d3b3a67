//! The top-level capture loop and producer/consumer synchronisation.
//!
//! One dedicated OS thread runs the whole cycle end-to-end: capture,
//! diff, cursor extraction and encoding are synchronous and strictly
//! ordered, since they share mutable frame buffers. The consumer side
//! talks to the loop only through a wake flag and condition variable
//! guarded by one mutex:
//!
//! - after handing off a result the loop blocks until the consumer
//!   requests more work (implicit backpressure);
//! - between cycles it waits out the paced delay on the same condvar, so
//!   an explicit update request or a stop interrupts the sleep early.
//!
//! Wake requests are coalesced: any number of requests while the loop is
//! busy collapse into one, and the loop performs exactly one full cycle
//! per wake. Termination is a sticky flag honoured at both suspension
//! points and before each capture; dropping the [`ScreenUpdater`] sets
//! it, wakes the thread and joins it.
//!
//! The thread is a plain OS thread rather than an async task:
//! `SetThreadDesktop` binds the calling thread, and every suspension
//! point is a blocking condvar wait.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bitflags::bitflags;
use tracing::{debug, error, info, warn};

use crate::capturer::ScreenCapturer;
use crate::cursor;
use crate::desktop::DesktopOps;
use crate::encoder::{
    CursorEncoder, CursorShape, VideoEncoding, VideoPacket, create_video_encoder,
};
use crate::error::CaptureError;
use crate::frame::PixelFormat;
use crate::scheduler::CaptureScheduler;

// ── Features ─────────────────────────────────────────────────────

bitflags! {
    /// Capture features requested once at loop construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u32 {
        /// Produce video packets for changed regions.
        const VIDEO        = 1 << 0;
        /// Extract and encode the cursor shape each cycle.
        const CURSOR_SHAPE = 1 << 1;
    }
}

// ── UpdaterConfig ────────────────────────────────────────────────

/// Configuration consumed once at loop construction; no hot reload.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Target inter-frame interval.
    pub update_interval: Duration,
    pub features: Features,
    pub video_encoding: VideoEncoding,
    /// Compression level for the zstd video encoder.
    pub zstd_level: i32,
    pub pixel_format: PixelFormat,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(40),
            features: Features::VIDEO | Features::CURSOR_SHAPE,
            video_encoding: VideoEncoding::Zstd,
            zstd_level: 1, // favour speed
            pixel_format: PixelFormat::Bgra8,
        }
    }
}

// ── Consumer hand-off ────────────────────────────────────────────

/// Result of one capture cycle, delivered to the consumer sink.
///
/// Once posted, ownership transfers to the consumer; the capture thread
/// never mutates it afterwards.
#[derive(Debug)]
pub enum UpdateEvent {
    /// At least one of the two parts is present.
    Update {
        video: Option<VideoPacket>,
        cursor: Option<CursorShape>,
    },
    /// Encoder initialisation failed (terminal) or capture has failed
    /// persistently (the loop keeps retrying).
    Error(CaptureError),
}

/// Caller-supplied consumer of update events.
///
/// Called from the capture thread; implementations should hand the event
/// off quickly (e.g. into a channel) rather than process it inline.
pub trait UpdateSink: Send + 'static {
    fn on_update(&mut self, event: UpdateEvent);
}

impl<F: FnMut(UpdateEvent) + Send + 'static> UpdateSink for F {
    fn on_update(&mut self, event: UpdateEvent) {
        self(event)
    }
}

// ── Wake protocol ────────────────────────────────────────────────

#[derive(Default)]
struct WakeState {
    update_required: bool,
    terminating: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<WakeState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_update(&self) {
        let mut state = self.lock();
        state.update_required = true;
        self.wake.notify_one();
    }

    fn request_stop(&self) {
        let mut state = self.lock();
        state.terminating = true;
        self.wake.notify_all();
    }

    fn is_terminating(&self) -> bool {
        self.lock().terminating
    }
}

/// Cloneable handle for waking or stopping the loop from the consumer
/// side.
#[derive(Clone)]
pub struct UpdaterHandle {
    shared: Arc<Shared>,
}

impl UpdaterHandle {
    /// Request one more cycle. Multiple requests while the loop is busy
    /// coalesce into a single wake.
    pub fn request_update(&self) {
        self.shared.request_update();
    }

    /// Request termination. Sticky; the loop exits at its next
    /// suspension point without starting another capture.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }
}

// ── ScreenUpdater ────────────────────────────────────────────────

/// Owner of the capture thread.
///
/// Dropping it stops the loop and joins the thread; the destructor does
/// not return until the thread has exited.
pub struct ScreenUpdater {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ScreenUpdater {
    /// Spawn the capture thread over the given desktop backend.
    pub fn start<D, S>(config: UpdaterConfig, desktop: D, sink: S) -> Result<Self, CaptureError>
    where
        D: DesktopOps + 'static,
        S: UpdateSink,
    {
        let shared = Arc::new(Shared::default());

        let update_loop = UpdateLoop {
            capturer: ScreenCapturer::new(desktop, config.pixel_format),
            cursor_encoder: config
                .features
                .contains(Features::CURSOR_SHAPE)
                .then(CursorEncoder::new),
            scheduler: CaptureScheduler::new(),
            shared: Arc::clone(&shared),
            config,
            sink,
        };

        let thread = thread::Builder::new()
            .name("screen-updater".into())
            .spawn(move || update_loop.run())?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> UpdaterHandle {
        UpdaterHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn request_update(&self) {
        self.shared.request_update();
    }

    pub fn request_stop(&self) {
        self.shared.request_stop();
    }
}

impl Drop for ScreenUpdater {
    fn drop(&mut self) {
        self.shared.request_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("screen update thread panicked");
            }
        }
    }
}

// ── UpdateLoop ───────────────────────────────────────────────────

/// Consecutive failed captures before a persistent error is surfaced to
/// the consumer.
const FAILURE_REPORT_THRESHOLD: u32 = 10;

struct UpdateLoop<D: DesktopOps, S: UpdateSink> {
    config: UpdaterConfig,
    shared: Arc<Shared>,
    capturer: ScreenCapturer<D>,
    cursor_encoder: Option<CursorEncoder>,
    scheduler: CaptureScheduler,
    sink: S,
}

impl<D: DesktopOps, S: UpdateSink> UpdateLoop<D, S> {
    fn run(mut self) {
        let mut video_encoder =
            match create_video_encoder(self.config.video_encoding, self.config.zstd_level) {
                Ok(encoder) => encoder,
                Err(e) => {
                    error!(error = %e, "encoder initialisation failed; update loop not started");
                    self.sink.on_update(UpdateEvent::Error(e));
                    return;
                }
            };

        info!(
            interval_ms = self.config.update_interval.as_millis() as u64,
            encoding = ?self.config.video_encoding,
            features = ?self.config.features,
            "screen update loop started"
        );

        let mut consecutive_failures: u32 = 0;

        loop {
            if self.shared.is_terminating() {
                break;
            }

            self.scheduler.begin_cycle();

            let mut video: Option<VideoPacket> = None;
            let mut cursor_shape: Option<CursorShape> = None;

            let captured = match self.capturer.capture_frame() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    if self.config.features.contains(Features::VIDEO)
                        && !frame.updated_region().is_empty()
                    {
                        match video_encoder.encode(frame) {
                            Ok(packet) => video = packet,
                            Err(e) => warn!(error = %e, "video encode failed"),
                        }
                    }
                    true
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, attempts = consecutive_failures, "capture failed");
                    if consecutive_failures == FAILURE_REPORT_THRESHOLD {
                        self.sink.on_update(UpdateEvent::Error(e));
                    }
                    false
                }
            };

            // Cursor extraction runs once per cycle, independently of
            // the video path; failure degrades to "no shape this cycle".
            if captured {
                if let Some(encoder) = self.cursor_encoder.as_mut() {
                    match self
                        .capturer
                        .desktop_mut()
                        .read_cursor()
                        .and_then(cursor::extract)
                    {
                        Ok(mouse_cursor) => match encoder.encode(&mouse_cursor) {
                            Ok(shape) => cursor_shape = shape,
                            Err(e) => warn!(error = %e, "cursor encode failed"),
                        },
                        Err(e) => debug!(error = %e, "no cursor shape this cycle"),
                    }
                }
            }

            if video.is_some() || cursor_shape.is_some() {
                // Any wake that arrived while we were capturing is
                // answered by this hand-off.
                self.shared.lock().update_required = false;

                self.sink.on_update(UpdateEvent::Update {
                    video,
                    cursor: cursor_shape,
                });

                // Backpressure: block until the consumer requests more
                // work or termination is requested.
                let mut state = self.shared.lock();
                while !state.update_required && !state.terminating {
                    state = self
                        .shared
                        .wake
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if state.terminating {
                    break;
                }
            }

            // Paced inter-cycle wait; an explicit update request or stop
            // interrupts the sleep early. Spurious wakeups fall through
            // to re-checking the predicate and the remaining delay.
            let mut state = self.shared.lock();
            state.update_required = false;
            loop {
                if state.terminating || state.update_required {
                    break;
                }
                let delay = self.scheduler.next_delay(self.config.update_interval);
                if delay.is_zero() {
                    break;
                }
                let (guard, timeout) = self
                    .shared
                    .wake
                    .wait_timeout(state, delay)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
                if timeout.timed_out() {
                    break;
                }
            }
            if state.terminating {
                break;
            }
        }

        info!("screen update loop stopped");
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::VirtualDesktop;
    use crate::geometry::Rect;
    use std::sync::mpsc;

    fn painted_desktop(width: u32, height: u32) -> VirtualDesktop {
        let mut desktop = VirtualDesktop::new(width, height);
        desktop.fill_rect(Rect::from_size(width, height), [40, 80, 120, 255]);
        desktop
    }

    fn fast_config() -> UpdaterConfig {
        UpdaterConfig {
            update_interval: Duration::from_millis(5),
            features: Features::VIDEO,
            ..UpdaterConfig::default()
        }
    }

    #[test]
    fn first_cycle_delivers_an_update_then_blocks() {
        let (tx, rx) = mpsc::channel();
        let updater = ScreenUpdater::start(fast_config(), painted_desktop(64, 64), move |ev| {
            tx.send(ev).ok();
        })
        .unwrap();

        // The first diff runs against a zeroed reference frame, so the
        // painted desktop produces a video packet.
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            UpdateEvent::Update { video, .. } => assert!(video.is_some()),
            other => panic!("unexpected event: {other:?}"),
        }

        // Without a consumer ack the loop stays in AwaitingConsumer.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        drop(updater);
    }

    #[test]
    fn consumer_ack_drives_the_next_update() {
        let (tx, rx) = mpsc::channel();
        let updater = ScreenUpdater::start(fast_config(), painted_desktop(64, 64), move |ev| {
            tx.send(ev).ok();
        })
        .unwrap();
        let handle = updater.handle();

        let _first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        handle.request_update();

        // The desktop is now static, so subsequent cycles package
        // nothing; no further events arrive even though cycles run.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        drop(updater);
    }

    #[test]
    fn stop_while_awaiting_consumer_exits_without_another_cycle() {
        let (tx, rx) = mpsc::channel();
        let updater = ScreenUpdater::start(fast_config(), painted_desktop(64, 64), move |ev| {
            tx.send(ev).ok();
        })
        .unwrap();

        let _first = rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Loop is blocked in AwaitingConsumer; drop stops and joins.
        drop(updater);

        // The sink was dropped with the thread; no second update was
        // produced.
        assert!(matches!(rx.recv(), Err(mpsc::RecvError)));
    }

    #[test]
    fn encoder_init_failure_is_terminal() {
        let (tx, rx) = mpsc::channel();
        let config = UpdaterConfig {
            zstd_level: 99,
            ..fast_config()
        };
        let updater = ScreenUpdater::start(config, painted_desktop(32, 32), move |ev| {
            tx.send(ev).ok();
        })
        .unwrap();

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            UpdateEvent::Error(CaptureError::EncoderInit(_)) => {}
            other => panic!("unexpected event: {other:?}"),
        }
        // The loop never started; the thread has already exited.
        assert!(matches!(rx.recv(), Err(mpsc::RecvError)));
        drop(updater);
    }

    #[test]
    fn persistent_capture_failure_is_surfaced_once() {
        let mut desktop = painted_desktop(32, 32);
        desktop.fail_creates(FAILURE_REPORT_THRESHOLD + 5);

        let (tx, rx) = mpsc::channel();
        let updater = ScreenUpdater::start(fast_config(), desktop, move |ev| {
            tx.send(ev).ok();
        })
        .unwrap();

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            UpdateEvent::Error(e) => assert!(e.is_resource()),
            other => panic!("unexpected event: {other:?}"),
        }

        // Once the injected failures expire the loop recovers and
        // delivers the painted frame.
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            UpdateEvent::Update { video, .. } => assert!(video.is_some()),
            other => panic!("unexpected event: {other:?}"),
        }

        drop(updater);
    }
}
