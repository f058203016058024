//! External camera process feeding the stream FIFO

use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Starts and stops whatever writes frames into the FIFO
pub trait CameraProducer: Send {
    fn start(&mut self, fifo: &Path) -> io::Result<()>;
    /// Idempotent
    fn stop(&mut self);
    fn is_running(&mut self) -> bool;
}

impl<P: CameraProducer + ?Sized> CameraProducer for Box<P> {
    fn start(&mut self, fifo: &Path) -> io::Result<()> {
        (**self).start(fifo)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn is_running(&mut self) -> bool {
        (**self).is_running()
    }
}

/// For hosts where frames arrive some other way, and for tests
#[derive(Debug, Default)]
pub struct NoopProducer {
    running: bool,
    starts: u32,
}

impl NoopProducer {
    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn running(&self) -> bool {
        self.running
    }
}

impl CameraProducer for NoopProducer {
    fn start(&mut self, _fifo: &Path) -> io::Result<()> {
        self.running = true;
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&mut self) -> bool {
        self.running
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibcameraConfig {
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Recording limit passed to the camera; the dwell limit normally ends
    /// camera mode first
    pub timeout_ms: u64,
    pub vflip: bool,
    /// Kill leftover instances before starting
    pub kill_stale: bool,
}

impl Default for LibcameraConfig {
    fn default() -> Self {
        Self {
            program: "libcamera-vid".to_string(),
            width: 128,
            height: 128,
            framerate: 12,
            timeout_ms: 300_000,
            vflip: true,
            kill_stale: true,
        }
    }
}

impl LibcameraConfig {
    /// Shell command line writing raw YUV 4:2:0 into `fifo`
    pub fn command_line(&self, fifo: &Path) -> String {
        let mut cmd = format!("exec {}", self.program);
        if self.vflip {
            cmd.push_str(" --vflip");
        }
        cmd.push_str(&format!(
            " --width {} --height {} --framerate {} --codec yuv420 --timeout {} --output - > '{}'",
            self.width,
            self.height,
            self.framerate,
            self.timeout_ms,
            fifo.display().to_string().replace('\'', "'\\''")
        ));
        cmd
    }
}

/// `libcamera-vid` child process writing into the FIFO
///
/// The shell `exec`s the camera so the child pid is the camera itself.
pub struct LibcameraProducer {
    config: LibcameraConfig,
    child: Option<Child>,
}

impl LibcameraProducer {
    const STOP_GRACE: Duration = Duration::from_millis(500);

    pub fn new(config: LibcameraConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    pub fn config(&self) -> &LibcameraConfig {
        &self.config
    }

    fn kill_stale(&self) {
        let status = Command::new("pkill")
            .arg("-f")
            .arg(&self.config.program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            log::debug!("pkill unavailable: {}", e);
        }
    }
}

impl CameraProducer for LibcameraProducer {
    fn start(&mut self, fifo: &Path) -> io::Result<()> {
        self.stop();
        if self.config.kill_stale {
            self.kill_stale();
        }

        let cmd = self.config.command_line(fifo);
        log::info!("Starting camera: {}", cmd);
        let child = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(Stdio::null())
            .spawn()?;
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        log::info!("Stopping camera (pid {})", child.id());

        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: signalling a child we spawned and have not yet reaped
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }

        let deadline = Instant::now() + Self::STOP_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => break,
            }
        }
        if let Err(e) = child.kill() {
            log::warn!("Failed to kill camera process: {}", e);
        }
        let _ = child.wait();
    }

    fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Drop for LibcameraProducer {
    fn drop(&mut self) {
        self.stop();
    }
}
