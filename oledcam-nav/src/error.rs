//! Navigation overlay errors

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavError {
    #[error("route file i/o: {0}")]
    Io(#[from] io::Error),

    #[error("route file has no header line")]
    MissingHeader,

    #[error("route file has no data line")]
    MissingData,

    #[error("unrecognised battery line: {0:?}")]
    BatteryLine(String),

    #[error("battery thresholds out of order: min {min} V, low {low} V, max {max} V")]
    BatteryThresholds { min: f32, low: f32, max: f32 },

    #[error("overlay buffer: {0}")]
    Buffer(#[from] oledcam_video::PoolError),

    #[error(transparent)]
    Display(#[from] oledcam_video::SinkError),
}
