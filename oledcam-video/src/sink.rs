//! Display sink capability
//!
//! The register-level SPI layer lives outside this crate; the pipeline only
//! needs "push this painted buffer to the panel and wait until it is out".

use crate::error::SinkError;
use crate::types::DisplayBuffer;
use parking_lot::Mutex;
use std::sync::Arc;

/// Blocking, hardware-paced display output
pub trait DisplaySink: Send {
    /// Transfer a fully painted buffer; returns once the panel has it
    fn present(&mut self, buffer: &DisplayBuffer) -> Result<(), SinkError>;
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn present(&mut self, buffer: &DisplayBuffer) -> Result<(), SinkError> {
        (**self).present(buffer)
    }
}

/// Sink shared between the video session and the navigation renderer
///
/// The mode controller guarantees only one of them presents at a time; the
/// lock is held for the duration of a single `present` only.
pub type SharedSink = Arc<Mutex<dyn DisplaySink>>;

pub fn shared_sink<S: DisplaySink + 'static>(sink: S) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Discards every buffer
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn present(&mut self, _buffer: &DisplayBuffer) -> Result<(), SinkError> {
        Ok(())
    }
}
