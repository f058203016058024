//! Control-layer errors

use oledcam_nav::NavError;
use oledcam_video::SessionError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PinError {
    #[error("pin read failed: {0}")]
    Read(#[from] io::Error),

    #[error("unexpected pin value {0:?}")]
    InvalidValue(String),

    #[error("pin backend error code {0}")]
    Backend(i32),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Pin(#[from] PinError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Nav(#[from] NavError),
}
