use chrono::NaiveDate;

use crate::bitmap::DayBitmap;
use crate::model::*;

use super::store::DAYS_PER_WEEK;
use super::{Engine, EngineError};

impl Engine {
    pub fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.bookings.get(&id).ok_or(EngineError::NotFound(id))
    }

    /// Every booking on the instructor's day, cancelled ones included, by start.
    pub fn bookings_for_instructor(&self, instructor_id: InstructorId, date: NaiveDate) -> Vec<Booking> {
        self.bookings.for_instructor(instructor_id, date)
    }

    pub fn bookings_for_student(&self, student_id: StudentId, date: NaiveDate) -> Vec<Booking> {
        self.bookings.for_student(student_id, date)
    }

    /// Raw bitmap for one day; empty if the week was never written.
    pub async fn get_day(&self, instructor_id: InstructorId, date: NaiveDate) -> DayBitmap {
        self.availability.get_day(instructor_id, date).await
    }

    pub async fn get_week(
        &self,
        instructor_id: InstructorId,
        week_start: NaiveDate,
    ) -> [DayBitmap; DAYS_PER_WEEK] {
        self.availability
            .get_week(instructor_id, super::store::week_start_of(week_start))
            .await
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn live_lock_keys(&self) -> usize {
        self.locks.live_keys()
    }
}
