//! Route step record and the CSV file it arrives in
//!
//! The phone app drops a two-line CSV (header + one data row) next to the
//! firmware. Only the current step is kept; when the file is empty or has no
//! data row the last good record is shown again.

use crate::error::NavError;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location written by the transfer service
pub const DEFAULT_ROUTE_FILE: &str = "received.csv";

/// `route_state` value that switches the overlay to the arrival screen
pub const ROUTE_STATE_ARRIVED: &str = "ARRIVED";

/// Turn instruction shown as an icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Maneuver {
    Left,
    Right,
    Straight,
    UTurn,
    Roundabout,
    Destination,
    Merge,
    #[default]
    Unknown,
}

impl Maneuver {
    /// Parse the numeric maneuver id; `None` for ids the panel has no icon for
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim() {
            "0" => Some(Maneuver::Left),
            "1" => Some(Maneuver::Right),
            "2" => Some(Maneuver::Straight),
            "3" => Some(Maneuver::UTurn),
            "4" => Some(Maneuver::Roundabout),
            "5" => Some(Maneuver::Destination),
            "6" => Some(Maneuver::Merge),
            "-1" => Some(Maneuver::Unknown),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Maneuver::Left => 0,
            Maneuver::Right => 1,
            Maneuver::Straight => 2,
            Maneuver::UTurn => 3,
            Maneuver::Roundabout => 4,
            Maneuver::Destination => 5,
            Maneuver::Merge => 6,
            Maneuver::Unknown => -1,
        }
    }
}

/// One step of the active route
#[derive(Debug, Clone, PartialEq)]
pub struct NavRecord {
    pub step_id: String,
    pub route_state: String,
    pub street_name: String,
    pub distance: String,
    /// Raw id as received; see [`NavRecord::maneuver`]
    pub maneuver_id: String,
    pub arrival_time: String,
    pub current_temp: String,
    pub current_weather: String,
    pub instructions: String,
}

impl Default for NavRecord {
    fn default() -> Self {
        let na = || "N/A".to_string();
        Self {
            step_id: na(),
            route_state: na(),
            street_name: na(),
            distance: na(),
            maneuver_id: na(),
            arrival_time: na(),
            current_temp: na(),
            current_weather: na(),
            instructions: na(),
        }
    }
}

impl NavRecord {
    /// Parse one comma-separated data row
    ///
    /// Missing trailing fields are left empty; extra fields are ignored.
    pub fn from_csv_row(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.split(',').map(str::to_string);
        let mut next = || fields.next().unwrap_or_default();
        Self {
            step_id: next(),
            route_state: next(),
            street_name: next(),
            distance: next(),
            maneuver_id: next(),
            arrival_time: next(),
            current_temp: next(),
            current_weather: next(),
            instructions: next(),
        }
    }

    pub fn maneuver(&self) -> Option<Maneuver> {
        Maneuver::from_id(&self.maneuver_id)
    }

    pub fn has_arrived(&self) -> bool {
        self.route_state.trim() == ROUTE_STATE_ARRIVED
    }
}

/// Parse the full file contents: a header line then a data line
pub fn parse_route_csv(text: &str) -> Result<NavRecord, NavError> {
    let mut lines = text.lines();
    lines.next().ok_or(NavError::MissingHeader)?;
    match lines.next() {
        Some(row) if !row.trim().is_empty() => Ok(NavRecord::from_csv_row(row)),
        _ => Err(NavError::MissingData),
    }
}

/// Route CSV on disk, re-read on every refresh
#[derive(Debug)]
pub struct RouteFile {
    path: PathBuf,
    last_valid: NavRecord,
}

impl RouteFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_valid: NavRecord::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record, falling back to the last valid one
    ///
    /// An unreadable file is reported; an empty or header-only file is
    /// normal while the phone is between transfers.
    pub fn refresh(&mut self) -> Result<&NavRecord, NavError> {
        let text = fs::read_to_string(&self.path)?;
        match parse_route_csv(&text) {
            Ok(record) => self.last_valid = record,
            Err(e) => log::debug!("{}: {}, using last valid data", self.path.display(), e),
        }
        Ok(&self.last_valid)
    }

    pub fn last_valid(&self) -> &NavRecord {
        &self.last_valid
    }
}
