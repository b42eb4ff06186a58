use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::bitmap::{DayBitmap, TimeOfDay, TimeWindow};

/// Unix milliseconds, used for audit timestamps only. Calendar logic runs on
/// instructor-local dates and wall-clock times.
pub type Ms = i64;

pub type InstructorId = Ulid;
pub type StudentId = Ulid;
pub type BookingId = Ulid;

/// Booking lifecycle. Only `Pending` and `Confirmed` occupy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Completed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::NoShow => "NO_SHOW",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub student_id: StudentId,
    pub instructor_id: InstructorId,
    pub instructor_service_id: Option<Ulid>,
    /// Instructor-local calendar date, exactly as the client sent it.
    pub booking_date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub status: BookingStatus,
    pub created_at: Ms,
}

impl Booking {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Active and sharing at least one minute with `window` on `date`.
    pub fn blocks(&self, date: NaiveDate, window: &TimeWindow) -> bool {
        self.status.is_active() && self.booking_date == date && self.window().overlaps(window)
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Listed days replaced; the week's version set to `version`.
    WeekUpserted {
        instructor_id: InstructorId,
        week_start: NaiveDate,
        version: u64,
        updated_at: Ms,
        days: Vec<(NaiveDate, DayBitmap)>,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: BookingId,
        instructor_id: InstructorId,
        status: BookingStatus,
    },
}

impl Event {
    /// Instructor whose change feed carries this event.
    pub fn instructor_id(&self) -> InstructorId {
        match self {
            Event::WeekUpserted { instructor_id, .. }
            | Event::BookingStatusChanged { instructor_id, .. } => *instructor_id,
            Event::BookingCreated { booking } => booking.instructor_id,
        }
    }
}
