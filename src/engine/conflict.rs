use chrono::NaiveDate;

use crate::bitmap::{TimeOfDay, TimeWindow};
use crate::limits::MAX_BOOKINGS_PER_DAY;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Reject zero-length and inverted spans before anything else runs. An end of
/// `00:00` after a later start is midnight at the close of the same day.
pub(crate) fn validate_request_window(
    start: TimeOfDay,
    end: TimeOfDay,
) -> Result<TimeWindow, EngineError> {
    let window = TimeWindow::new(start, end);
    window.validate()?;
    Ok(window)
}

/// First active booking in `existing` that shares time with `window` on `date`.
pub(crate) fn check_no_conflict(
    existing: &[Booking],
    date: NaiveDate,
    window: &TimeWindow,
) -> Result<(), EngineError> {
    let active = existing.iter().filter(|b| b.status.is_active()).count();
    if active >= MAX_BOOKINGS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many bookings on one day"));
    }
    match existing.iter().find(|b| b.blocks(date, window)) {
        Some(taken) => Err(EngineError::Conflict(taken.id)),
        None => Ok(()),
    }
}
