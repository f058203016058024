//! Error types for the frame-delivery pipeline

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Geometry and configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VideoError {
    #[error("invalid geometry {width}x{height}: dimensions must be non-zero and even")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("invalid frame rate {num}/{den}")]
    InvalidFrameRate { num: u32, den: u32 },

    #[error("geometry mismatch: frame is {frame_w}x{frame_h}, buffer is {buf_w}x{buf_h}")]
    GeometryMismatch {
        frame_w: u32,
        frame_h: u32,
        buf_w: u32,
        buf_h: u32,
    },
}

/// Errors produced by a [`FrameSource`](crate::source::FrameSource)
///
/// Every variant is fatal to the session that observes it. A looping file
/// source absorbs end-of-file internally and only surfaces these when the
/// file itself is unusable.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Producer closed the stream exactly on a frame boundary
    #[error("end of stream")]
    EndOfStream,

    /// Fewer bytes than one full frame were available
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    /// The underlying file or pipe could not be opened or read
    #[error("source closed: {0}")]
    Closed(#[from] io::Error),
}

/// Errors reported by a [`DisplaySink`](crate::sink::DisplaySink)
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("display rejected buffer of {got} bytes (expected {expected})")]
    BufferSize { expected: usize, got: usize },

    #[error("display transfer failed with status {0}")]
    Transfer(i32),

    #[error("display i/o: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the double-buffer pool
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("failed to allocate {bytes} bytes for display buffer")]
    Allocation { bytes: usize },

    #[error("a write handle is already outstanding")]
    WriteInProgress,

    #[error("handle does not belong to this pool")]
    ForeignHandle,
}

/// Errors setting up the frame transport channel
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0} exists but is not a FIFO")]
    NotAFifo(PathBuf),

    #[error("path {0} contains an interior NUL byte")]
    InvalidPath(PathBuf),

    #[error("failed to create FIFO {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),
}

/// Errors from [`DisplaySession`](crate::session::DisplaySession) lifecycle calls
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a display session is already active")]
    AlreadyActive,

    #[error(transparent)]
    Config(#[from] VideoError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to spawn session worker: {0}")]
    Spawn(#[source] io::Error),
}
