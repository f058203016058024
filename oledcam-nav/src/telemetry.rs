//! Battery telemetry and the snapshot shared with the overlay renderer
//!
//! The serial reader is the only writer and the navigation loop the only
//! reader. The lock is held just long enough to copy the snapshot.

use crate::error::NavError;
use crate::record::NavRecord;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Serial port the battery gauge reports on
pub const DEFAULT_SERIAL_PORT: &str = "/dev/serial0";

/// Voltage-to-charge mapping for the single LiPo cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryCurve {
    /// Reads as 0 %
    pub min_voltage: f32,
    /// Reads as 100 %
    pub max_voltage: f32,
    /// Below this the pack is flagged low
    pub low_voltage: f32,
}

impl Default for BatteryCurve {
    fn default() -> Self {
        Self {
            min_voltage: 3.0,
            max_voltage: 3.8,
            low_voltage: 3.3,
        }
    }
}

impl BatteryCurve {
    /// Linear percentage, clamped to 0..=100
    pub fn percentage(&self, voltage: f32) -> f32 {
        if voltage <= self.min_voltage {
            return 0.0;
        }
        if voltage >= self.max_voltage {
            return 100.0;
        }
        (voltage - self.min_voltage) / (self.max_voltage - self.min_voltage) * 100.0
    }

    pub fn is_low(&self, voltage: f32) -> bool {
        voltage < self.low_voltage
    }

    pub fn reading(&self, voltage: f32) -> BatteryReading {
        BatteryReading {
            voltage,
            percentage: self.percentage(voltage),
            low: self.is_low(voltage),
        }
    }
}

/// Extract the voltage from a `Battery Voltage: 3.71 V` line
pub fn parse_battery_line(line: &str) -> Result<f32, NavError> {
    let bad = || NavError::BatteryLine(line.to_string());
    let rest = line
        .trim()
        .strip_prefix("Battery Voltage:")
        .ok_or_else(bad)?;
    let value = rest.trim().trim_end_matches('V').trim();
    value.parse::<f32>().map_err(|_| bad())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub voltage: f32,
    pub percentage: f32,
    pub low: bool,
}

/// Everything the overlay needs for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub battery: Option<BatteryReading>,
    pub route: NavRecord,
}

/// Single-writer/single-reader hand-off of the latest telemetry
#[derive(Debug, Clone, Default)]
pub struct TelemetryHub {
    inner: Arc<Mutex<TelemetrySnapshot>>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_battery(&self, reading: BatteryReading) {
        self.inner.lock().battery = Some(reading);
    }

    pub fn publish_route(&self, record: &NavRecord) {
        let mut guard = self.inner.lock();
        if guard.route != *record {
            guard.route = record.clone();
        }
    }

    /// Copy out the latest values; never held across rendering
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.lock().clone()
    }
}

/// Background reader turning gauge lines into battery readings
pub struct BatteryMonitor {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BatteryMonitor {
    /// Spawn the reader thread over any line source (normally the UART)
    pub fn spawn<R>(reader: R, curve: BatteryCurve, hub: TelemetryHub) -> std::io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("oledcam-battery".to_string())
            .spawn(move || {
                log::info!("Battery monitor listening");
                for line in reader.lines() {
                    if !flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            log::warn!("Battery monitor read failed: {}", e);
                            break;
                        }
                    };
                    let Ok(voltage) = parse_battery_line(&line) else {
                        continue;
                    };
                    let reading = curve.reading(voltage);
                    if reading.low {
                        log::warn!("Low battery: {:.2} V", voltage);
                    }
                    log::debug!("Battery {:.2} V ({:.0}%)", voltage, reading.percentage);
                    hub.publish_battery(reading);
                }
                log::info!("Battery monitor exiting");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Monitor a line-oriented device such as the gauge's serial port
    ///
    /// Line settings (baud rate) are left to the host.
    pub fn open(
        path: impl AsRef<Path>,
        curve: BatteryCurve,
        hub: TelemetryHub,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        log::info!("Reading battery gauge from {}", path.display());
        Self::spawn(BufReader::new(file), curve, hub)
    }

    /// Stop after the next line (or at end of input) and join
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}
