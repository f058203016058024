//! Frame-pacing display session
//!
//! One worker thread pulls frames from a [`FrameSource`], paints them into
//! the back slot of a [`BufferPool`], swaps, presents the new front buffer
//! and sleeps out the rest of the frame period. A session is
//! `Inactive -> Active -> Inactive`; the pool lives exactly as long as the
//! worker.

use crate::config::VideoConfig;
use crate::error::{PoolError, SessionError, SinkError, SourceError, VideoError};
use crate::fifo::{ensure_fifo, wake_reader, FifoGuard};
use crate::format_conversion::convert_frame;
use crate::frame_pool::BufferPool;
use crate::sink::SharedSink;
use crate::source::{FileLoopSource, FrameSource, StreamSource};
use crate::types::SourceKind;
use crossbeam::channel::{self, Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Set while any session worker runs in this process; the panel has one writer
static PANEL_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Held by a running worker; dropping it frees the panel for the next session
struct PanelClaim;

impl PanelClaim {
    fn acquire() -> Option<Self> {
        PANEL_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PanelClaim)
    }
}

impl Drop for PanelClaim {
    fn drop(&mut self) {
        PANEL_CLAIMED.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Active,
}

/// Why a session worker stopped
#[derive(Debug)]
pub enum SessionExit {
    /// `stop()` was requested
    Stopped,
    /// The source could not be opened or the first frame never arrived
    StartAborted(SourceError),
    /// The source failed after streaming began
    SourceFailed(SourceError),
    /// The panel rejected a buffer
    SinkFailed(SinkError),
    /// Source and pool disagree on frame layout
    Conversion(VideoError),
    Pool(PoolError),
    /// The worker thread panicked
    Panicked,
}

impl SessionExit {
    /// Anything other than a requested stop
    pub fn is_failure(&self) -> bool {
        !matches!(self, SessionExit::Stopped)
    }
}

/// Final accounting for one session, returned when its worker is joined
#[derive(Debug)]
pub struct SessionReport {
    pub kind: SourceKind,
    pub frames_presented: u64,
    pub late_frames: u64,
    pub elapsed: Duration,
    pub exit: SessionExit,
}

/// Live statistics (lock-free reads)
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    pub state: SessionState,
    pub kind: Option<SourceKind>,
    pub frames_presented: u64,
    pub late_frames: u64,
    pub uptime: Duration,
}

impl SessionStats {
    pub fn measured_fps(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_presented as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct Counters {
    frames_presented: AtomicU64,
    late_frames: AtomicU64,
}

struct Worker {
    kind: SourceKind,
    started_at: Instant,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    streaming_rx: Receiver<()>,
    handle: JoinHandle<SessionReport>,
}

/// Drives one panel from one frame source at a time
pub struct DisplaySession {
    config: VideoConfig,
    sink: SharedSink,
    worker: Option<Worker>,
    /// Unlinks the FIFO on drop if this session created it
    fifo: Option<FifoGuard>,
}

impl DisplaySession {
    pub fn new(config: VideoConfig, sink: SharedSink) -> Self {
        Self {
            config,
            sink,
            worker: None,
            fifo: None,
        }
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    /// `Active` while a worker is running; a worker that ended on its own
    /// reads as `Inactive` even before it is reaped
    pub fn state(&self) -> SessionState {
        match &self.worker {
            Some(w) if !w.handle.is_finished() => SessionState::Active,
            _ => SessionState::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Loop a recording. The file is opened here so a missing file is
    /// reported to the caller rather than from the worker.
    pub fn start_file(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        self.ensure_startable()?;
        let source = FileLoopSource::open(path, self.config.geometry)?;
        self.start_with(SourceKind::File, move || Ok(source))
    }

    /// Play the live stream from the configured FIFO
    ///
    /// The FIFO is created (or verified) here; opening it blocks until the
    /// producer attaches, so that happens on the worker.
    pub fn start_stream(&mut self) -> Result<(), SessionError> {
        self.ensure_startable()?;
        let path = self.config.stream_path.clone();
        if self.fifo.as_ref().map_or(false, |guard| guard.path() == path) {
            ensure_fifo(&path, self.config.fifo_mode)?;
        } else {
            self.fifo = Some(FifoGuard::ensure(&path, self.config.fifo_mode)?);
        }
        let geometry = self.config.geometry;
        self.start_with(SourceKind::Stream, move || {
            StreamSource::open_fifo(&path, geometry)
        })
    }

    /// Start a session over any source
    ///
    /// `open` runs on the worker thread. Buffers are allocated before the
    /// worker is spawned; allocation failure is returned here. Only one
    /// session in the process may run at a time, whichever value owns it.
    pub fn start_with<F, S>(&mut self, kind: SourceKind, open: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Result<S, SourceError> + Send + 'static,
        S: FrameSource + 'static,
    {
        self.ensure_startable()?;
        self.config.validate()?;

        let pool = BufferPool::new(self.config.geometry)?;
        let claim = PanelClaim::acquire().ok_or(SessionError::AlreadyActive)?;
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());
        let (streaming_tx, streaming_rx) = channel::bounded(1);

        let ctx = WorkerContext {
            kind,
            config: self.config.clone(),
            sink: self.sink.clone(),
            running: running.clone(),
            counters: counters.clone(),
            streaming_tx,
        };

        let handle = thread::Builder::new()
            .name("oledcam-session".to_string())
            .spawn(move || {
                let _claim = claim;
                ctx.run(open, pool)
            })
            .map_err(SessionError::Spawn)?;

        log::info!(
            "Display session started ({:?}, {}/{} fps)",
            kind,
            self.config.fps_num,
            self.config.fps_den
        );

        self.worker = Some(Worker {
            kind,
            started_at: Instant::now(),
            running,
            counters,
            streaming_rx,
            handle,
        });
        Ok(())
    }

    /// Request cooperative shutdown and join the worker
    ///
    /// Idempotent; returns `None` when there was nothing to stop. May wait
    /// for one in-flight blocking read plus one frame period.
    pub fn stop(&mut self) -> Option<SessionReport> {
        let worker = self.worker.take()?;
        worker.running.store(false, Ordering::Release);
        if worker.kind == SourceKind::Stream {
            self.release_fifo_open(&worker);
        }
        Some(Self::join(worker))
    }

    /// Join a worker that already ended on its own
    ///
    /// Returns `None` while the worker is still running.
    pub fn reap(&mut self) -> Option<SessionReport> {
        if !self.worker.as_ref()?.handle.is_finished() {
            return None;
        }
        let worker = self.worker.take()?;
        Some(Self::join(worker))
    }

    /// Wait until the first full frame has been presented
    ///
    /// Returns `false` on timeout, or if the worker ended before streaming.
    pub fn wait_until_streaming(&self, timeout: Duration) -> bool {
        match &self.worker {
            Some(w) => w.streaming_rx.recv_timeout(timeout).is_ok(),
            None => false,
        }
    }

    pub fn stats(&self) -> SessionStats {
        match &self.worker {
            Some(w) => SessionStats {
                state: self.state(),
                kind: Some(w.kind),
                frames_presented: w.counters.frames_presented.load(Ordering::Relaxed),
                late_frames: w.counters.late_frames.load(Ordering::Relaxed),
                uptime: w.started_at.elapsed(),
            },
            None => SessionStats {
                state: SessionState::Inactive,
                kind: None,
                frames_presented: 0,
                late_frames: 0,
                uptime: Duration::ZERO,
            },
        }
    }

    /// Refuse to start over a live worker; silently reap a dead one
    fn ensure_startable(&mut self) -> Result<(), SessionError> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        if let Some(report) = self.reap() {
            log::debug!("Reaped finished session: {:?}", report.exit);
        }
        Ok(())
    }

    /// A stream worker whose producer never attached is parked in the FIFO
    /// open and would never see the stop flag
    fn release_fifo_open(&self, worker: &Worker) {
        const ATTEMPTS: u32 = 100;

        for _ in 0..ATTEMPTS {
            if worker.handle.is_finished()
                || worker.counters.frames_presented.load(Ordering::Relaxed) > 0
            {
                return;
            }
            match wake_reader(&self.config.stream_path) {
                Ok(true) => return,
                Ok(false) => thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    log::warn!("Could not release stream reader: {}", e);
                    return;
                }
            }
        }
    }

    fn join(worker: Worker) -> SessionReport {
        let kind = worker.kind;
        match worker.handle.join() {
            Ok(report) => {
                log::info!(
                    "Display session stopped after {} frames ({:?})",
                    report.frames_presented,
                    report.exit
                );
                report
            }
            Err(_) => {
                log::error!("Display session worker panicked");
                SessionReport {
                    kind,
                    frames_presented: worker.counters.frames_presented.load(Ordering::Relaxed),
                    late_frames: worker.counters.late_frames.load(Ordering::Relaxed),
                    elapsed: worker.started_at.elapsed(),
                    exit: SessionExit::Panicked,
                }
            }
        }
    }
}

impl Drop for DisplaySession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    kind: SourceKind,
    config: VideoConfig,
    sink: SharedSink,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    streaming_tx: Sender<()>,
}

impl WorkerContext {
    fn run<F, S>(self, open: F, pool: BufferPool) -> SessionReport
    where
        F: FnOnce() -> Result<S, SourceError>,
        S: FrameSource,
    {
        let started = Instant::now();

        if let Some(id) = self.config.worker_core {
            if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
                log::warn!("Could not pin session worker to core {}", id);
            }
        }

        let exit = match open() {
            Ok(source) if source.geometry() != pool.geometry() => {
                let (fg, bg) = (source.geometry(), pool.geometry());
                SessionExit::Conversion(VideoError::GeometryMismatch {
                    frame_w: fg.width(),
                    frame_h: fg.height(),
                    buf_w: bg.width(),
                    buf_h: bg.height(),
                })
            }
            Ok(source) => self.pace(source, pool),
            Err(e) => {
                log::error!("Failed to open frame source: {}", e);
                SessionExit::StartAborted(e)
            }
        };

        if exit.is_failure() {
            log::warn!("Display session ended: {:?}", exit);
        }

        SessionReport {
            kind: self.kind,
            frames_presented: self.counters.frames_presented.load(Ordering::Relaxed),
            late_frames: self.counters.late_frames.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
            exit,
        }
    }

    /// The pacing loop; consumes and frees the pool on exit
    fn pace<S: FrameSource>(&self, mut source: S, mut pool: BufferPool) -> SessionExit {
        let frame_period = self.config.frame_period();
        let parallel = self.config.parallel_conversion;
        let log_every = self.config.log_interval_frames.max(1);
        let stream_start = Instant::now();
        let mut streaming = false;

        while self.running.load(Ordering::Acquire) {
            let frame_start = Instant::now();

            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) if !streaming => return SessionExit::StartAborted(e),
                Err(e) => return SessionExit::SourceFailed(e),
            };

            let handle = match pool.acquire_write() {
                Ok(h) => h,
                Err(e) => return SessionExit::Pool(e),
            };
            let painted = pool
                .buffer_mut(&handle)
                .map_err(SessionExit::Pool)
                .and_then(|buf| convert_frame(&frame, buf, parallel).map_err(SessionExit::Conversion));
            if let Err(exit) = painted {
                let _ = pool.abandon(handle);
                return exit;
            }
            let front = match pool.commit_and_swap(handle) {
                Ok(front) => front,
                Err(e) => return SessionExit::Pool(e),
            };

            if let Err(e) = self.sink.lock().present(front) {
                return SessionExit::SinkFailed(e);
            }

            let presented = self.counters.frames_presented.fetch_add(1, Ordering::Relaxed) + 1;
            if !streaming {
                streaming = true;
                let _ = self.streaming_tx.try_send(());
            }
            if presented % log_every == 0 {
                let elapsed = stream_start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    log::info!(
                        "Presented {} frames in {:.1} seconds ({:.2} FPS)",
                        presented,
                        elapsed,
                        presented as f64 / elapsed
                    );
                }
            }

            // Falling behind is absorbed: no drop, no catch-up
            let elapsed = frame_start.elapsed();
            if elapsed < frame_period {
                thread::sleep(frame_period - elapsed);
            } else {
                self.counters.late_frames.fetch_add(1, Ordering::Relaxed);
            }
        }

        SessionExit::Stopped
    }
}
