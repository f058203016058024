//! Polling button debouncer
//!
//! Takes a fixed number of samples at a fixed interval and accepts the
//! level only if every sample agrees. Blocks the caller for the whole
//! window.

use crate::error::PinError;
use crate::pin::{InputPin, Level};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Samples per window; at least one is always taken
    pub samples: u32,
    /// Sleep between consecutive samples
    pub interval: Duration,
    /// Level that means "pressed"
    pub active_level: Level,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            interval: Duration::from_millis(1),
            active_level: Level::High,
        }
    }
}

impl DebounceConfig {
    /// Total time one debounced read blocks for
    pub fn window(&self) -> Duration {
        self.interval * self.samples.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Stable(Level),
    Unstable,
}

/// Turns raw pin reads into stable levels
///
/// Swappable for an edge-interrupt implementation without touching the
/// gesture logic.
pub trait Debouncer: Send {
    fn sample(&mut self, pin: &mut dyn InputPin) -> Result<Reading, PinError>;

    /// The level treated as pressed
    fn active_level(&self) -> Level;
}

#[derive(Debug, Clone, Default)]
pub struct PollingDebouncer {
    config: DebounceConfig,
}

impl PollingDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }
}

impl Debouncer for PollingDebouncer {
    fn sample(&mut self, pin: &mut dyn InputPin) -> Result<Reading, PinError> {
        let first = pin.read()?;
        let mut stable = true;

        // Keep sampling after a disagreement so the window length is fixed
        for _ in 1..self.config.samples {
            if !self.config.interval.is_zero() {
                thread::sleep(self.config.interval);
            }
            if pin.read()? != first {
                stable = false;
            }
        }

        Ok(if stable {
            Reading::Stable(first)
        } else {
            Reading::Unstable
        })
    }

    fn active_level(&self) -> Level {
        self.config.active_level
    }
}
