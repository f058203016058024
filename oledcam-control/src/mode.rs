//! Camera / navigation mode arbitration
//!
//! [`ModeMachine`] is the pure decision table. [`ModeController`] owns the
//! display session, the navigation screen, the camera producer and the
//! button, and applies the machine's decisions. Leaving a mode always
//! finishes (producer stopped, session joined) before the next one starts,
//! so only one writer ever drives the panel.

use crate::camera::CameraProducer;
use crate::config::{CameraFeed, ControllerConfig};
use crate::debounce::Debouncer;
use crate::error::ControlError;
use crate::gesture::LockGesture;
use crate::pin::InputPin;
use oledcam_nav::NavigationScreen;
use oledcam_video::{DisplaySession, SessionError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Camera,
    Navigation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Completed press-hold-release
    LockGesture,
    /// Camera mode has run for the configured dwell
    DwellExpired,
    /// The display session ended or never started
    SessionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stay,
    Switch(Mode),
    /// Tear down and start a fresh camera session
    RestartCamera,
}

#[derive(Debug, Clone)]
pub struct ModeMachine {
    mode: Mode,
    restart_on_failure: bool,
}

impl ModeMachine {
    pub fn new(initial: Mode, restart_on_failure: bool) -> Self {
        Self {
            mode: initial,
            restart_on_failure,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn handle(&mut self, event: ControlEvent) -> Action {
        use ControlEvent as E;
        use Mode::{Camera, Navigation};

        let action = match (self.mode, event) {
            (Navigation, E::LockGesture) => Action::Switch(Camera),
            (Navigation, E::DwellExpired | E::SessionFailed) => Action::Stay,

            (Camera, E::LockGesture | E::DwellExpired) => Action::Switch(Navigation),
            (Camera, E::SessionFailed) if self.restart_on_failure => Action::RestartCamera,
            (Camera, E::SessionFailed) => Action::Switch(Navigation),
        };
        if let Action::Switch(mode) = action {
            self.mode = mode;
        }
        action
    }
}

/// Runs the mode loop on the calling thread
pub struct ModeController<P, D, C> {
    config: ControllerConfig,
    machine: ModeMachine,
    pin: P,
    gesture: LockGesture<D>,
    session: DisplaySession,
    screen: NavigationScreen,
    producer: C,
    running: Arc<AtomicBool>,
    entered: bool,
    camera_since: Option<Instant>,
    switches: u64,
}

impl<P, D, C> ModeController<P, D, C>
where
    P: InputPin,
    D: Debouncer,
    C: CameraProducer,
{
    pub fn new(
        config: ControllerConfig,
        pin: P,
        debouncer: D,
        session: DisplaySession,
        screen: NavigationScreen,
        producer: C,
    ) -> Self {
        Self {
            machine: ModeMachine::new(config.initial_mode, config.restart_stream_on_failure),
            gesture: LockGesture::new(debouncer, config.gesture),
            config,
            pin,
            session,
            screen,
            producer,
            running: Arc::new(AtomicBool::new(true)),
            entered: false,
            camera_since: None,
            switches: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.machine.mode()
    }

    pub fn session(&self) -> &DisplaySession {
        &self.session
    }

    pub fn screen(&self) -> &NavigationScreen {
        &self.screen
    }

    pub fn producer(&self) -> &C {
        &self.producer
    }

    /// Mode changes performed so far (restarts not counted)
    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Clear to make [`ModeController::run`] return after the current step
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Step until the shutdown flag is cleared, then leave the current mode
    pub fn run(&mut self) -> Result<(), ControlError> {
        log::info!("Mode controller starting in {:?} mode", self.mode());
        let result = loop {
            if !self.running.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Err(e) = self.step() {
                break Err(e);
            }
        };
        if self.mode() == Mode::Camera {
            self.leave_camera();
        }
        if let Err(e) = self.screen.clear() {
            log::warn!("Could not blank the panel: {}", e);
        }
        log::info!("Mode controller stopped after {} switches", self.switches);
        result
    }

    /// One iteration of the current mode's loop
    pub fn step(&mut self) -> Result<Mode, ControlError> {
        if !self.entered {
            self.entered = true;
            if self.mode() == Mode::Camera {
                self.enter_camera();
            }
        }

        match self.mode() {
            Mode::Navigation => self.navigation_step()?,
            Mode::Camera => self.camera_step()?,
        }
        Ok(self.mode())
    }

    fn navigation_step(&mut self) -> Result<(), ControlError> {
        if let Err(e) = self.screen.tick() {
            log::warn!("Navigation render failed: {}", e);
        }

        if self.gesture.poll(&mut self.pin, None)? {
            self.dispatch(ControlEvent::LockGesture);
        } else {
            pause(self.config.nav_tick);
        }
        Ok(())
    }

    fn camera_step(&mut self) -> Result<(), ControlError> {
        if !self.session.is_active() {
            if let Some(report) = self.session.reap() {
                log::warn!(
                    "Camera session ended after {} frames: {:?}",
                    report.frames_presented,
                    report.exit
                );
            }
            self.dispatch(ControlEvent::SessionFailed);
            return Ok(());
        }

        let dwell_over = self
            .camera_since
            .map_or(false, |since| since.elapsed() >= self.config.camera_dwell);
        if dwell_over {
            log::info!("Camera dwell of {:?} reached", self.config.camera_dwell);
            self.dispatch(ControlEvent::DwellExpired);
            return Ok(());
        }

        // A held button must not keep the camera past its dwell
        let deadline = self.camera_since.map(|since| since + self.config.camera_dwell);
        if self.gesture.poll(&mut self.pin, deadline)? {
            self.dispatch(ControlEvent::LockGesture);
        } else {
            pause(self.config.camera_poll);
        }
        Ok(())
    }

    fn dispatch(&mut self, event: ControlEvent) {
        let from = self.mode();
        match self.machine.handle(event) {
            Action::Stay => {}
            Action::Switch(to) => {
                log::info!("Switching {:?} -> {:?} ({:?})", from, to, event);
                self.switches += 1;
                if from == Mode::Camera {
                    self.leave_camera();
                }
                self.gesture.reset();
                if to == Mode::Camera {
                    self.enter_camera();
                }
            }
            Action::RestartCamera => {
                log::info!("Restarting camera session");
                self.leave_camera();
                self.enter_camera();
            }
        }
    }

    /// Start the session, then the producer that feeds it
    ///
    /// Failures are shown on the panel; the next step sees an inactive
    /// session and reports it to the machine.
    fn enter_camera(&mut self) {
        self.camera_since = Some(Instant::now());

        let started = match &self.config.feed {
            CameraFeed::Stream => self.session.start_stream(),
            CameraFeed::File(path) => self.session.start_file(path),
        };
        if let Err(e) = started {
            log::error!("Failed to start camera session: {}", e);
            let message = match e {
                SessionError::Transport(_) => "Pipe Error!",
                _ => "Display Error!",
            };
            self.show_error(message);
            return;
        }

        if self.config.feed == CameraFeed::Stream {
            let path = self.session.config().stream_path.clone();
            if let Err(e) = self.producer.start(&path) {
                log::error!("Failed to start camera producer: {}", e);
                self.session.stop();
                self.show_error("Camera Error!");
            }
        }
    }

    /// Producer first so a blocked stream read sees end-of-stream, then
    /// join the session
    fn leave_camera(&mut self) {
        self.producer.stop();
        if let Some(report) = self.session.stop() {
            log::info!(
                "Camera session: {} frames, {} late, {:.1}s",
                report.frames_presented,
                report.late_frames,
                report.elapsed.as_secs_f64()
            );
        }
        self.camera_since = None;
    }

    fn show_error(&mut self, message: &str) {
        if let Err(e) = self.screen.show_message(message) {
            log::warn!("Could not show {:?}: {}", message, e);
        }
        pause(self.config.message_hold);
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::NoopProducer;
    use crate::debounce::{DebounceConfig, PollingDebouncer};
    use crate::error::PinError;
    use crate::pin::scripted::ScriptedPin;
    use crate::pin::Level;
    use oledcam_nav::{RouteFile, TelemetryHub};
    use oledcam_video::{
        shared_sink, DisplayBuffer, DisplaySink, Geometry, SinkError, VideoConfig,
    };
    use parking_lot::Mutex;
    use std::path::Path;

    type TestController<P = ScriptedPin> = ModeController<P, PollingDebouncer, NoopProducer>;

    /// A button shorted to its active level
    struct StuckPin;

    impl InputPin for StuckPin {
        fn read(&mut self) -> Result<Level, PinError> {
            Ok(Level::High)
        }
    }

    struct CountingSink(Arc<Mutex<usize>>);

    impl DisplaySink for CountingSink {
        fn present(&mut self, _buffer: &DisplayBuffer) -> Result<(), SinkError> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    fn geometry() -> Geometry {
        Geometry::new(16, 16).unwrap()
    }

    fn write_recording(dir: &Path, frames: usize) -> std::path::PathBuf {
        let path = dir.join("clip.yuv420");
        std::fs::write(&path, vec![100u8; geometry().frame_size() * frames]).unwrap();
        path
    }

    fn controller<P: InputPin>(
        dir: &Path,
        feed: CameraFeed,
        pin: P,
        tweak: impl FnOnce(&mut ControllerConfig),
    ) -> (TestController<P>, Arc<Mutex<usize>>) {
        let presented = Arc::new(Mutex::new(0));
        let sink = shared_sink(CountingSink(presented.clone()));

        let mut config = ControllerConfig {
            debounce: DebounceConfig {
                samples: 2,
                interval: Duration::ZERO,
                active_level: Level::High,
            },
            nav_tick: Duration::ZERO,
            camera_poll: Duration::from_millis(1),
            message_hold: Duration::ZERO,
            feed,
            ..ControllerConfig::default()
        };
        tweak(&mut config);

        let video = VideoConfig::default()
            .with_geometry(geometry())
            .with_fps(200, 1)
            .with_stream_path(dir.join("pipe"));
        let session = DisplaySession::new(video, sink.clone());
        let screen = NavigationScreen::new(
            geometry(),
            RouteFile::new(dir.join("received.csv")),
            TelemetryHub::new(),
            sink,
        )
        .unwrap();

        let controller = ModeController::new(
            config.clone(),
            pin,
            PollingDebouncer::new(config.debounce),
            session,
            screen,
            NoopProducer::default(),
        );
        (controller, presented)
    }

    /// Press held for three debounce windows, then released
    fn lock_gesture() -> Vec<Level> {
        [vec![Level::High; 6], vec![Level::Low; 2]].concat()
    }

    #[test]
    fn test_machine_table() {
        let mut m = ModeMachine::new(Mode::Navigation, false);
        assert_eq!(m.handle(ControlEvent::DwellExpired), Action::Stay);
        assert_eq!(m.handle(ControlEvent::SessionFailed), Action::Stay);
        assert_eq!(m.handle(ControlEvent::LockGesture), Action::Switch(Mode::Camera));
        assert_eq!(m.mode(), Mode::Camera);
        assert_eq!(m.handle(ControlEvent::DwellExpired), Action::Switch(Mode::Navigation));
        assert_eq!(m.handle(ControlEvent::LockGesture), Action::Switch(Mode::Camera));
        assert_eq!(m.handle(ControlEvent::LockGesture), Action::Switch(Mode::Navigation));
        m.handle(ControlEvent::LockGesture);
        assert_eq!(m.handle(ControlEvent::SessionFailed), Action::Switch(Mode::Navigation));
    }

    #[test]
    fn test_machine_restart_policy() {
        let mut m = ModeMachine::new(Mode::Camera, true);
        assert_eq!(m.handle(ControlEvent::SessionFailed), Action::RestartCamera);
        assert_eq!(m.mode(), Mode::Camera);
    }

    #[test]
    #[serial_test::serial]
    fn test_gesture_toggles_modes_exactly_once_each() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_recording(dir.path(), 2);
        let pin = ScriptedPin::new(lock_gesture());
        let (mut c, presented) = controller(dir.path(), CameraFeed::File(clip), pin.clone(), |_| {});

        assert_eq!(c.step().unwrap(), Mode::Camera);
        assert_eq!(c.switches(), 1);
        assert!(c.session().is_active());
        assert!(c.session().wait_until_streaming(Duration::from_secs(2)));

        // Released button: camera keeps running
        for _ in 0..3 {
            assert_eq!(c.step().unwrap(), Mode::Camera);
        }
        assert_eq!(c.switches(), 1);

        pin.push(lock_gesture());
        assert_eq!(c.step().unwrap(), Mode::Navigation);
        assert_eq!(c.switches(), 2);
        assert!(!c.session().is_active());

        // Overlay frame from the first step plus at least one video frame
        assert!(*presented.lock() >= 2);
    }

    #[test]
    #[serial_test::serial]
    fn test_jitter_never_switches() {
        let dir = tempfile::tempdir().unwrap();
        let bounce: Vec<Level> = (0..40).map(|i| Level::from_bool(i % 2 == 0)).collect();
        let (mut c, _) = controller(dir.path(), CameraFeed::Stream, ScriptedPin::new(bounce), |_| {});

        for _ in 0..20 {
            assert_eq!(c.step().unwrap(), Mode::Navigation);
        }
        assert_eq!(c.switches(), 0);
        assert!(!c.session().is_active());
    }

    #[test]
    #[serial_test::serial]
    fn test_dwell_returns_to_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_recording(dir.path(), 1);
        let (mut c, _) = controller(
            dir.path(),
            CameraFeed::File(clip),
            ScriptedPin::new([Level::Low; 0]),
            |config| {
                config.initial_mode = Mode::Camera;
                config.camera_dwell = Duration::ZERO;
            },
        );

        assert_eq!(c.step().unwrap(), Mode::Navigation);
        assert_eq!(c.switches(), 1);
        assert!(!c.session().is_active());
    }

    #[test]
    #[serial_test::serial]
    fn test_stuck_button_cannot_outlast_dwell() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_recording(dir.path(), 1);
        let (mut c, _) = controller(dir.path(), CameraFeed::File(clip), StuckPin, |config| {
            config.initial_mode = Mode::Camera;
            config.camera_dwell = Duration::from_millis(30);
        });

        let start = Instant::now();
        assert_eq!(c.step().unwrap(), Mode::Camera);
        assert!(c.session().is_active());
        assert_eq!(c.step().unwrap(), Mode::Navigation);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(c.switches(), 1);
        assert!(!c.session().is_active());
    }

    #[test]
    #[serial_test::serial]
    fn test_start_failure_falls_back_to_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let short = dir.path().join("short.yuv420");
        std::fs::write(&short, [0u8; 10]).unwrap();
        let (mut c, presented) = controller(
            dir.path(),
            CameraFeed::File(short),
            ScriptedPin::new(lock_gesture()),
            |_| {},
        );

        // Lock from navigation; camera start fails and shows an error
        assert_eq!(c.step().unwrap(), Mode::Camera);
        let after_error = *presented.lock();
        assert_eq!(after_error, 2);

        assert_eq!(c.step().unwrap(), Mode::Navigation);
        assert_eq!(c.switches(), 2);
    }

    #[test]
    #[serial_test::serial]
    fn test_restart_policy_retries_camera() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yuv420");
        let (mut c, _) = controller(
            dir.path(),
            CameraFeed::File(missing),
            ScriptedPin::new([Level::Low; 0]),
            |config| {
                config.initial_mode = Mode::Camera;
                config.restart_stream_on_failure = true;
            },
        );

        for _ in 0..3 {
            assert_eq!(c.step().unwrap(), Mode::Camera);
        }
        assert_eq!(c.switches(), 0);
    }

    #[test]
    #[serial_test::serial]
    fn test_stream_feed_starts_producer() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _) = controller(
            dir.path(),
            CameraFeed::Stream,
            ScriptedPin::new(lock_gesture()),
            |_| {},
        );

        assert_eq!(c.step().unwrap(), Mode::Camera);
        assert_eq!(c.producer().starts(), 1);
        assert!(dir.path().join("pipe").exists());

        // Nothing ever writes the FIFO; leaving must still join the worker
        c.shutdown_flag().store(false, Ordering::Relaxed);
        c.run().unwrap();
        assert!(!c.session().is_active());
        assert!(!c.producer().running());
    }

    #[test]
    #[serial_test::serial]
    fn test_run_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, presented) = controller(
            dir.path(),
            CameraFeed::Stream,
            ScriptedPin::new([Level::Low; 0]),
            |config| config.nav_tick = Duration::from_millis(2),
        );
        let flag = c.shutdown_flag();

        let worker = thread::spawn(move || {
            let result = c.run();
            (result.is_ok(), c.mode())
        });
        thread::sleep(Duration::from_millis(50));
        flag.store(false, Ordering::Relaxed);

        let (ok, mode) = worker.join().unwrap();
        assert!(ok);
        assert_eq!(mode, Mode::Navigation);
        assert!(*presented.lock() >= 1);
    }
}
