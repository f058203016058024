//! Video pipeline configuration

use crate::error::VideoError;
use crate::fifo::{DEFAULT_FIFO_MODE, DEFAULT_STREAM_PATH};
use crate::types::Geometry;
use std::path::PathBuf;
use std::time::Duration;

/// Frame rate the capture process is started with
pub const DEFAULT_FPS: u32 = 12;

/// Startup configuration for a display session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConfig {
    pub geometry: Geometry,
    pub fps_num: u32,
    pub fps_den: u32,
    pub stream_path: PathBuf,
    pub fifo_mode: u32,
    /// Pin the pacing worker to this core
    pub worker_core: Option<usize>,
    /// Split colour conversion across rayon's pool
    pub parallel_conversion: bool,
    /// Presented-frame interval between throughput log lines
    pub log_interval_frames: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            fps_num: DEFAULT_FPS,
            fps_den: 1,
            stream_path: PathBuf::from(DEFAULT_STREAM_PATH),
            fifo_mode: DEFAULT_FIFO_MODE,
            worker_core: None,
            parallel_conversion: false,
            log_interval_frames: 300,
        }
    }
}

impl VideoConfig {
    pub fn validate(&self) -> Result<(), VideoError> {
        if self.fps_num == 0 || self.fps_den == 0 {
            return Err(VideoError::InvalidFrameRate {
                num: self.fps_num,
                den: self.fps_den,
            });
        }
        Ok(())
    }

    /// Target time between presentations
    pub fn frame_period(&self) -> Duration {
        let frame_interval_ns = (self.fps_den as u64 * 1_000_000_000) / self.fps_num as u64;
        Duration::from_nanos(frame_interval_ns)
    }

    pub fn with_fps(mut self, fps_num: u32, fps_den: u32) -> Self {
        self.fps_num = fps_num;
        self.fps_den = fps_den;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_stream_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stream_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_panel() {
        let config = VideoConfig::default();
        assert_eq!(config.geometry.width(), 128);
        assert_eq!(config.geometry.height(), 128);
        assert_eq!(config.fps_num, 12);
        assert_eq!(config.stream_path, PathBuf::from("/tmp/stream_pipe"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_period() {
        let config = VideoConfig::default().with_fps(50, 1);
        assert_eq!(config.frame_period(), Duration::from_millis(20));

        let ntsc = VideoConfig::default().with_fps(30000, 1001);
        assert_eq!(ntsc.frame_period(), Duration::from_nanos(33_366_666));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = VideoConfig::default().with_fps(0, 1);
        assert_eq!(
            config.validate(),
            Err(VideoError::InvalidFrameRate { num: 0, den: 1 })
        );
    }
}
