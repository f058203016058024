//! OLED camera video pipeline
//!
//! Streams raw YUV 4:2:0 frames onto a small SPI RGB565 panel at a fixed
//! frame rate.
//!
//! Key pieces:
//! - Fixed-point colourspace conversion, optionally row-parallel
//! - Two-slot buffer pool with a single write token
//! - Looping file and FIFO stream frame sources
//! - A paced worker with cooperative, joined shutdown

pub mod config;
pub mod error;
pub mod fifo;
pub mod format_conversion;
pub mod frame_pool;
pub mod session;
pub mod sink;
pub mod source;
pub mod types;

pub use config::*;
pub use error::*;
pub use fifo::*;
pub use format_conversion::*;
pub use frame_pool::*;
pub use session::*;
pub use sink::*;
pub use source::*;
pub use types::*;
