//! Digital input abstraction
//!
//! Implemented by whatever owns the GPIO line on the host: a sysfs value
//! file here, a C callback across the FFI, or a script in tests.

use crate::error::PinError;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// Synchronous single-line digital input
pub trait InputPin: Send {
    /// One instantaneous read of the raw level
    fn read(&mut self) -> Result<Level, PinError>;
}

impl<P: InputPin + ?Sized> InputPin for Box<P> {
    fn read(&mut self) -> Result<Level, PinError> {
        (**self).read()
    }
}

/// Pin exposed as a `0`/`1` value file (sysfs GPIO, gpio-sim)
#[derive(Debug, Clone)]
pub struct ValueFilePin {
    path: PathBuf,
}

impl ValueFilePin {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `/sys/class/gpio/gpio<N>/value`
    pub fn sysfs(line: u32) -> Self {
        Self::new(format!("/sys/class/gpio/gpio{}/value", line))
    }
}

impl InputPin for ValueFilePin {
    fn read(&mut self) -> Result<Level, PinError> {
        let raw = fs::read_to_string(&self.path)?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(PinError::InvalidValue(other.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays a fixed sequence of levels, then reads low (released)
    #[derive(Clone)]
    pub struct ScriptedPin {
        script: Arc<Mutex<VecDeque<Level>>>,
        reads: Arc<Mutex<usize>>,
    }

    impl ScriptedPin {
        pub fn new(levels: impl IntoIterator<Item = Level>) -> Self {
            Self {
                script: Arc::new(Mutex::new(levels.into_iter().collect())),
                reads: Arc::new(Mutex::new(0)),
            }
        }

        /// `low` lows, then `high` highs, then low again
        pub fn press(low: usize, high: usize) -> Self {
            Self::new(
                std::iter::repeat(Level::Low)
                    .take(low)
                    .chain(std::iter::repeat(Level::High).take(high)),
            )
        }

        pub fn push(&self, levels: impl IntoIterator<Item = Level>) {
            self.script.lock().extend(levels);
        }

        pub fn remaining(&self) -> usize {
            self.script.lock().len()
        }

        pub fn reads(&self) -> usize {
            *self.reads.lock()
        }
    }

    impl InputPin for ScriptedPin {
        fn read(&mut self) -> Result<Level, PinError> {
            *self.reads.lock() += 1;
            Ok(self.script.lock().pop_front().unwrap_or(Level::Low))
        }
    }
}
