use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::bitmap::BitmapError;
use crate::model::BookingStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed window or time. Caller bug; never worth retrying.
    #[error(transparent)]
    InvalidWindow(#[from] BitmapError),
    /// Stale `If-Match`. Carries the token to retry with.
    #[error("version conflict: current version is {current_etag}")]
    VersionConflict { current_etag: String },
    #[error("requested time is not available")]
    NotAvailable,
    #[error("conflicts with active booking {0}")]
    Conflict(Ulid),
    #[error("reservation lock busy; retry")]
    Busy,
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    #[error("date {date} is outside the week starting {week_start}")]
    DateOutsideWeek { date: NaiveDate, week_start: NaiveDate },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Errors a client resolves on its own by re-fetching or backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::VersionConflict { .. } | EngineError::Conflict(_) | EngineError::Busy
        )
    }
}
