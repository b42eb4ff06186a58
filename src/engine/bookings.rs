use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::{Booking, BookingId, BookingStatus, InstructorId, StudentId};

/// Booking rows plus the two per-day indices the conflict checks walk.
pub struct BookingStore {
    bookings: DashMap<BookingId, Booking>,
    by_instructor: DashMap<(InstructorId, NaiveDate), Vec<BookingId>>,
    by_student: DashMap<(StudentId, NaiveDate), Vec<BookingId>>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            by_instructor: DashMap::new(),
            by_student: DashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn get(&self, id: &BookingId) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// Ignores an id that is already present, so replaying a creation the
    /// compacted snapshot already holds changes nothing.
    pub fn insert(&self, booking: Booking) {
        let Entry::Vacant(slot) = self.bookings.entry(booking.id) else {
            return;
        };
        let date = booking.booking_date;
        self.by_instructor
            .entry((booking.instructor_id, date))
            .or_default()
            .push(booking.id);
        self.by_student
            .entry((booking.student_id, date))
            .or_default()
            .push(booking.id);
        slot.insert(booking);
    }

    /// Returns the updated row, or `None` if the id is unknown.
    pub fn set_status(&self, id: &BookingId, status: BookingStatus) -> Option<Booking> {
        let mut entry = self.bookings.get_mut(id)?;
        entry.status = status;
        Some(entry.clone())
    }

    pub fn for_instructor(&self, instructor_id: InstructorId, date: NaiveDate) -> Vec<Booking> {
        let ids = self
            .by_instructor
            .get(&(instructor_id, date))
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.rows(&ids)
    }

    pub fn for_student(&self, student_id: StudentId, date: NaiveDate) -> Vec<Booking> {
        let ids = self
            .by_student
            .get(&(student_id, date))
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.rows(&ids)
    }

    fn rows(&self, ids: &[BookingId]) -> Vec<Booking> {
        let mut rows: Vec<Booking> = ids.iter().filter_map(|id| self.get(id)).collect();
        rows.sort_by_key(|b| (b.start_time, b.id));
        rows
    }

    pub fn all(&self) -> Vec<Booking> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }
}
