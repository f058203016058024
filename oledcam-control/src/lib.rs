//! Button-driven mode control for the OLED camera
//!
//! A single debounced push-button switches the panel between the live
//! camera feed and the navigation overlay with a long-press gesture.
//!
//! Key pieces:
//! - Polling debouncer behind a swappable trait
//! - Explicit Idle/Pressed/Held gesture state machine
//! - Pure mode decision table and the controller that applies it
//! - Camera producer process management

pub mod camera;
pub mod config;
pub mod debounce;
pub mod error;
pub mod gesture;
pub mod mode;
pub mod pin;

pub use camera::*;
pub use config::*;
pub use debounce::*;
pub use error::*;
pub use gesture::*;
pub use mode::*;
pub use pin::*;
