use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::bitmap::TimeOfDay;
use crate::engine::{EngineError, ReservationRequest, TimezoneSource, display_start};
use crate::model::{Booking, BookingId, BookingStatus};

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::identity::{Caller, Instructor, Student};

#[derive(Debug, Deserialize)]
pub struct CreateBooking {
    pub instructor_id: Ulid,
    #[serde(default)]
    pub instructor_service_id: Option<Ulid>,
    pub booking_date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

/// A booking plus its start as an instant in the instructor's zone.
#[derive(Debug, Serialize)]
pub struct BookingBody {
    #[serde(flatten)]
    pub booking: Booking,
    pub local_start: Option<String>,
}

impl BookingBody {
    fn new(state: &AppState, booking: Booking) -> Self {
        let zone = state.engine.config().timezones.timezone_for(booking.instructor_id);
        let local_start = display_start(booking.booking_date, booking.start_time, &zone).map(|t| t.to_rfc3339());
        Self { booking, local_start }
    }
}

/// Bookings the caller is not party to read as missing.
fn visible_to(caller: Caller, booking: Booking) -> ApiResult<Booking> {
    if caller.is_party_to(&booking) {
        Ok(booking)
    } else {
        Err(EngineError::NotFound(booking.id).into())
    }
}

pub async fn create(
    State(state): State<AppState>,
    Student(student_id): Student,
    body: Result<Json<CreateBooking>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BookingBody>)> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let booking = state
        .engine
        .reserve(ReservationRequest {
            student_id,
            instructor_id: body.instructor_id,
            instructor_service_id: body.instructor_service_id,
            booking_date: body.booking_date,
            start_time: body.start_time,
            end_time: body.end_time,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(BookingBody::new(&state, booking))))
}

pub async fn get_one(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
) -> ApiResult<Json<BookingBody>> {
    let booking = visible_to(caller, state.engine.get_booking(id)?)?;
    Ok(Json(BookingBody::new(&state, booking)))
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<BookingBody>>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let rows = match caller {
        Caller::Instructor(id) => state.engine.bookings_for_instructor(id, query.date),
        Caller::Student(id) => state.engine.bookings_for_student(id, query.date),
    };
    Ok(Json(rows.into_iter().map(|b| BookingBody::new(&state, b)).collect()))
}

/// Either party may cancel.
pub async fn cancel(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
) -> ApiResult<Json<BookingBody>> {
    visible_to(caller, state.engine.get_booking(id)?)?;
    let booking = state.engine.cancel_booking(id).await?;
    Ok(Json(BookingBody::new(&state, booking)))
}

/// Instructor-driven lifecycle moves: confirm, complete, no-show, cancel.
pub async fn set_status(
    State(state): State<AppState>,
    Instructor(instructor_id): Instructor,
    Path(id): Path<BookingId>,
    body: Result<Json<StatusChange>, JsonRejection>,
) -> ApiResult<Json<BookingBody>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    visible_to(Caller::Instructor(instructor_id), state.engine.get_booking(id)?)?;
    let booking = state.engine.transition_booking(id, body.status).await?;
    Ok(Json(BookingBody::new(&state, booking)))
}
