use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::bitmap::TimeOfDay;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_request_window};
use super::locks::LockKey;
use super::resolver::resolve;
use super::{Engine, EngineError, WalCommand};

/// A student's request for one span of an instructor's day. Date and times are
/// instructor-local wall clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub student_id: StudentId,
    pub instructor_id: InstructorId,
    pub instructor_service_id: Option<Ulid>,
    pub booking_date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!(crate::observability::RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
}

impl Engine {
    /// Reserve a span: validate against the day bitmap, then check and insert
    /// under the (instructor, date) and (student, date) keys. Only the final
    /// WAL append mutates anything; every earlier exit leaves no trace.
    pub async fn reserve(&self, req: ReservationRequest) -> Result<Booking, EngineError> {
        let window = validate_request_window(req.start_time, req.end_time)?;

        let timezone = self.config.timezones.timezone_for(req.instructor_id);
        let date = resolve(req.booking_date, window.start, window.end, &timezone);

        let day = self.availability.get_day(req.instructor_id, date).await;
        if !day.covers(&window) {
            debug!(instructor_id = %req.instructor_id, %date, start = %window.start, end = %window.end, "reservation rejected: not available");
            record_outcome("not_available");
            return Err(EngineError::NotAvailable);
        }

        let keys = [
            LockKey::Instructor(req.instructor_id, date),
            LockKey::Student(req.student_id, date),
        ];
        let wait_started = std::time::Instant::now();
        let held = self.locks.acquire_all(&keys, self.config.lock_wait).await;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_started.elapsed().as_secs_f64());
        let _held = held.inspect_err(|_| {
            debug!(instructor_id = %req.instructor_id, student_id = %req.student_id, %date, "reservation rejected: lock busy");
            record_outcome("busy");
        })?;

        let conflict = check_no_conflict(&self.bookings.for_instructor(req.instructor_id, date), date, &window)
            .and_then(|()| check_no_conflict(&self.bookings.for_student(req.student_id, date), date, &window));
        if let Err(e) = conflict {
            debug!(instructor_id = %req.instructor_id, student_id = %req.student_id, %date, "reservation rejected: {e}");
            record_outcome("conflict");
            return Err(e);
        }

        let booking = Booking {
            id: Ulid::new(),
            student_id: req.student_id,
            instructor_id: req.instructor_id,
            instructor_service_id: req.instructor_service_id,
            booking_date: date,
            start_time: window.start,
            end_time: window.end,
            status: BookingStatus::Pending,
            created_at: now_ms(),
        };
        self.persist_booking_event(&Event::BookingCreated {
            booking: booking.clone(),
        })
        .await
        .inspect_err(|_| record_outcome("wal_error"))?;

        record_outcome("reserved");
        info!(booking_id = %booking.id, instructor_id = %booking.instructor_id, %date, start = %booking.start_time, end = %booking.end_time, "booking reserved");
        Ok(booking)
    }

    /// Cancelling takes the booking out of the active set, which is all it
    /// takes to free its span.
    pub async fn cancel_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.transition_booking(id, BookingStatus::Cancelled).await
    }

    /// Move a booking along its lifecycle. Changes to the same booking are
    /// serialized so log order matches apply order.
    pub async fn transition_booking(
        &self,
        id: BookingId,
        next: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let _held = self
            .locks
            .acquire_all(&[LockKey::Booking(id)], self.config.lock_wait)
            .await?;
        let current = self.bookings.get(&id).ok_or(EngineError::NotFound(id))?;
        if !current.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let event = Event::BookingStatusChanged {
            id,
            instructor_id: current.instructor_id,
            status: next,
        };
        self.persist_booking_event(&event).await?;
        info!(booking_id = %id, from = %current.status, to = %next, "booking status changed");
        self.bookings.get(&id).ok_or(EngineError::NotFound(id))
    }

    /// Rewrite the WAL as the minimal event set that rebuilds current state:
    /// one upsert per written week at its current version, then every booking
    /// as it stands now, then whatever committed while the snapshot was taken.
    /// Replaying an event the snapshot already reflects is a no-op.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        {
            // No commit is between its append and its apply while the mark is set.
            let _gate = self.commit_gate.write().await;
            let (tx, rx) = oneshot::channel();
            self.wal_tx
                .send(WalCommand::BeginCompaction { response: tx })
                .await
                .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
            rx.await
                .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?;
        }

        let mut events = Vec::new();
        for (instructor_id, week_start, state) in self.availability.all_weeks().await {
            let days = super::store::week_dates(week_start).zip(state.days).collect();
            events.push(Event::WeekUpserted {
                instructor_id,
                week_start,
                version: state.version,
                updated_at: state.updated_at.unwrap_or(0),
                days,
            });
        }
        let mut bookings = self.bookings.all();
        bookings.sort_by_key(|b| b.id);
        events.extend(bookings.into_iter().map(|booking| Event::BookingCreated { booking }));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
