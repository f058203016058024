//! Navigation overlay for the OLED camera
//!
//! Renders the current route step, battery level and weather onto the
//! panel while the camera feed is not shown.
//!
//! Key pieces:
//! - Route CSV feed with last-valid fallback
//! - Battery gauge reader publishing into a shared telemetry snapshot
//! - Layout pass producing draw items, replayed onto a raster canvas

pub mod canvas;
pub mod config;
pub mod error;
pub mod font;
pub mod overlay;
pub mod record;
pub mod telemetry;

pub use canvas::*;
pub use config::*;
pub use error::*;
pub use overlay::*;
pub use record::*;
pub use telemetry::*;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
