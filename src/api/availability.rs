use axum::{
    Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use crate::engine::{EngineError, ScheduleEntry, WeekView, WeekWrite, WritePrecondition};
use crate::model::Ms;

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::identity::Instructor;

pub const X_ALLOW_PAST: &str = "x-allow-past";
pub const EXPOSED_HEADERS: &str = "ETag, Last-Modified, X-Allow-Past";

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub start_date: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteQuery {
    #[serde(default, rename = "override")]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct WeekBody {
    pub week_start: NaiveDate,
    #[serde(default)]
    pub clear_existing: bool,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

fn http_date(ms: Ms) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|t| t.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

fn allow_past_value(allow_past: bool) -> HeaderValue {
    HeaderValue::from_static(if allow_past { "true" } else { "false" })
}

fn week_response(view: WeekView) -> ApiResult<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ETAG, HeaderValue::from_str(&view.etag)?);
    headers.insert(X_ALLOW_PAST, allow_past_value(view.allow_past));
    if let Some(modified) = view.last_modified.and_then(http_date) {
        headers.insert(header::LAST_MODIFIED, HeaderValue::from_str(&modified)?);
    }
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok((headers, Json(view.days)).into_response())
}

pub async fn get_week(
    State(state): State<AppState>,
    Instructor(instructor_id): Instructor,
    query: Result<Query<WeekQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let view = state.engine.read_week(instructor_id, query.start_date).await;
    week_response(view)
}

pub async fn post_week(
    State(state): State<AppState>,
    Instructor(instructor_id): Instructor,
    query: Result<Query<WriteQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Json<WeekBody>, JsonRejection>,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let precondition = if query.force {
        WritePrecondition::Override
    } else {
        match headers.get(header::IF_MATCH) {
            Some(value) => {
                let token = value
                    .to_str()
                    .map_err(|_| ApiError::BadRequest("If-Match is not valid ASCII".into()))?;
                WritePrecondition::IfMatch(token.to_string())
            }
            None => WritePrecondition::None,
        }
    };

    let write = WeekWrite {
        week_start: body.week_start,
        clear_existing: body.clear_existing,
        schedule: body.schedule,
        precondition,
    };
    match state.engine.write_week(instructor_id, write).await {
        Ok(view) => week_response(view),
        Err(err @ EngineError::VersionConflict { .. }) => {
            let mut response = ApiError::from(err).into_response();
            response
                .headers_mut()
                .insert(X_ALLOW_PAST, allow_past_value(state.engine.config().allow_past));
            Ok(response)
        }
        Err(err) => Err(err.into()),
    }
}
