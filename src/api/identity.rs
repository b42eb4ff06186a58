//! Caller identity as established by the upstream auth layer.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use ulid::Ulid;

use crate::model::{InstructorId, StudentId};

use super::error::ApiError;

pub const INSTRUCTOR_HEADER: &str = "x-instructor-id";
pub const STUDENT_HEADER: &str = "x-student-id";

/// `Ok(None)` when the header is absent. A header that is present but not a
/// ULID is rejected rather than ignored.
fn header_ulid(headers: &HeaderMap, name: &str, label: &'static str) -> Result<Option<Ulid>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Ulid::from_string(v.trim()).ok())
        .map(Some)
        .ok_or(ApiError::Unauthorized(label))
}

pub struct Instructor(pub InstructorId);

pub struct Student(pub StudentId);

/// Either party. An instructor header wins when both are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Instructor(InstructorId),
    Student(StudentId),
}

impl Caller {
    pub fn is_party_to(self, booking: &crate::model::Booking) -> bool {
        match self {
            Caller::Instructor(id) => booking.instructor_id == id,
            Caller::Student(id) => booking.student_id == id,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Instructor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_ulid(&parts.headers, INSTRUCTOR_HEADER, "X-Instructor-Id")?
            .map(Instructor)
            .ok_or(ApiError::Unauthorized("X-Instructor-Id"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Student {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_ulid(&parts.headers, STUDENT_HEADER, "X-Student-Id")?
            .map(Student)
            .ok_or(ApiError::Unauthorized("X-Student-Id"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let instructor = header_ulid(&parts.headers, INSTRUCTOR_HEADER, "X-Instructor-Id")?;
        let student = header_ulid(&parts.headers, STUDENT_HEADER, "X-Student-Id")?;
        instructor
            .map(Caller::Instructor)
            .or(student.map(Caller::Student))
            .ok_or(ApiError::Unauthorized("X-Instructor-Id or X-Student-Id"))
    }
}
