use std::time::{Duration, Instant};

use chrono::offset::Offset as _;
use chrono::{Datelike as _, Local, Timelike as _, Utc};

/// Which wall clock a time query reads. `Local` doubles as the emulated
/// in-game clock; alarms compare against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeScale {
    Utc,
    Local,
}

impl TimeScale {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeScale::Utc => "utc",
            TimeScale::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utc" => Some(TimeScale::Utc),
            "local" | "ingame" => Some(TimeScale::Local),
            _ => None,
        }
    }
}

fn fractional_hours(hour: u32, minute: u32, second: u32) -> f64 {
    hour as f64 + minute as f64 / 60.0 + second as f64 / 3600.0
}

/// Wall-clock and uptime readings for one machine instance.
#[derive(Debug)]
pub struct Clock {
    started: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time of day in fractional hours, `0.0..24.0`. This is the value alarm
    /// targets are compared against.
    pub fn time_of_day(&self, scale: TimeScale) -> f64 {
        match scale {
            TimeScale::Utc => {
                let now = Utc::now();
                fractional_hours(now.hour(), now.minute(), now.second())
            }
            TimeScale::Local => {
                let now = Local::now();
                fractional_hours(now.hour(), now.minute(), now.second())
            }
        }
    }

    /// Milliseconds since the Unix epoch; the local scale shifts by the
    /// current UTC offset.
    pub fn epoch_ms(&self, scale: TimeScale) -> i64 {
        let utc_ms = Utc::now().timestamp_millis();
        match scale {
            TimeScale::Utc => utc_ms,
            TimeScale::Local => {
                let offset_s = Local::now().offset().fix().local_minus_utc() as i64;
                utc_ms + offset_s * 1000
            }
        }
    }

    /// Zero-based day of the year on the local calendar.
    pub fn day(&self) -> i64 {
        Local::now().ordinal0() as i64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
