//! Navigation screen configuration

use crate::error::NavError;
use crate::record::DEFAULT_ROUTE_FILE;
use crate::telemetry::{BatteryCurve, DEFAULT_SERIAL_PORT};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct NavConfig {
    /// CSV written by the phone transfer service
    pub route_csv: PathBuf,
    /// Line-oriented battery gauge output
    pub serial_port: PathBuf,
    pub battery: BatteryCurve,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            route_csv: PathBuf::from(DEFAULT_ROUTE_FILE),
            serial_port: PathBuf::from(DEFAULT_SERIAL_PORT),
            battery: BatteryCurve::default(),
        }
    }
}

impl NavConfig {
    /// Battery thresholds must be ordered for the percentage curve to hold
    pub fn validate(&self) -> Result<(), NavError> {
        let b = &self.battery;
        if b.min_voltage < b.max_voltage && b.low_voltage >= b.min_voltage {
            Ok(())
        } else {
            Err(NavError::BatteryThresholds {
                min: b.min_voltage,
                low: b.low_voltage,
                max: b.max_voltage,
            })
        }
    }

    pub fn with_route_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.route_csv = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NavConfig::default();
        assert_eq!(config.route_csv, PathBuf::from("received.csv"));
        assert_eq!(config.battery.low_voltage, 3.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_curve_rejected() {
        let mut config = NavConfig::default();
        config.battery.min_voltage = 4.0;
        assert!(matches!(
            config.validate(),
            Err(NavError::BatteryThresholds { min, .. }) if min == 4.0
        ));
    }

    #[test]
    fn test_low_threshold_below_floor_rejected() {
        let mut config = NavConfig::default();
        config.battery.low_voltage = config.battery.min_voltage - 0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().starts_with("battery thresholds out of order"));
    }
}
