//! Mode controller configuration

use crate::debounce::DebounceConfig;
use crate::gesture::GestureConfig;
use crate::mode::Mode;
use std::path::PathBuf;
use std::time::Duration;

/// What camera mode plays
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CameraFeed {
    /// Live frames from the producer through the FIFO
    #[default]
    Stream,
    /// Loop a recorded `.yuv420` file
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub debounce: DebounceConfig,
    pub gesture: GestureConfig,
    /// Camera mode falls back to navigation after this long
    pub camera_dwell: Duration,
    /// Delay between overlay refreshes
    pub nav_tick: Duration,
    /// Delay between button polls in camera mode
    pub camera_poll: Duration,
    /// Start a fresh session when the stream dies instead of leaving camera mode
    pub restart_stream_on_failure: bool,
    pub initial_mode: Mode,
    /// How long an error message stays up before carrying on
    pub message_hold: Duration,
    pub feed: CameraFeed,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce: DebounceConfig::default(),
            gesture: GestureConfig::default(),
            camera_dwell: Duration::from_secs(300),
            nav_tick: Duration::from_millis(100),
            camera_poll: Duration::from_millis(100),
            restart_stream_on_failure: false,
            initial_mode: Mode::Navigation,
            message_hold: Duration::from_secs(2),
            feed: CameraFeed::Stream,
        }
    }
}
