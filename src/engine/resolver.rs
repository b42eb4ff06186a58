//! Calendar date resolution for booking requests.
//!
//! Clients send the instructor's wall-clock date together with wall-clock start
//! and end times in the instructor's zone. That date is the one whose bitmap is
//! consulted, full stop. Converting the local time to UTC and back before
//! taking the date moves early-morning spans onto the neighbouring day for any
//! zone with a non-zero offset, so the timezone never touches the date here.
//! Zone handling exists only for display and runs after validation.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;

use crate::bitmap::TimeOfDay;
use crate::model::InstructorId;

/// Returns `requested_date` for every input.
pub fn resolve(
    requested_date: NaiveDate,
    _start: TimeOfDay,
    _end: TimeOfDay,
    _instructor_timezone: &str,
) -> NaiveDate {
    requested_date
}

/// Unknown names display as UTC.
pub fn display_zone(name: &str) -> Tz {
    Tz::from_str(name).unwrap_or(Tz::UTC)
}

/// The booking's start as an absolute instant, for display. `None` when the
/// local time falls in a DST gap.
pub fn display_start(date: NaiveDate, start: TimeOfDay, timezone: &str) -> Option<DateTime<Tz>> {
    let local = date.and_time(start.to_naive()?);
    display_zone(timezone).from_local_datetime(&local).earliest()
}

/// Source of each instructor's IANA zone name.
pub trait TimezoneSource: Send + Sync {
    fn timezone_for(&self, instructor_id: InstructorId) -> String;
}

/// Configured default plus per-instructor overrides.
#[derive(Debug, Clone)]
pub struct StaticTimezones {
    default: String,
    overrides: HashMap<InstructorId, String>,
}

impl StaticTimezones {
    pub fn new(default: impl Into<String>, overrides: HashMap<InstructorId, String>) -> Self {
        Self {
            default: default.into(),
            overrides,
        }
    }

    pub fn utc() -> Self {
        Self::new("UTC", HashMap::new())
    }
}

impl TimezoneSource for StaticTimezones {
    fn timezone_for(&self, instructor_id: InstructorId) -> String {
        self.overrides
            .get(&instructor_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}
