//! HTTP surface: instructor week availability and student bookings.

pub mod availability;
pub mod bookings;
pub mod error;
pub mod identity;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{Instrument, info_span};

use crate::engine::Engine;
use crate::limits::MAX_BODY_BYTES;
use crate::observability::{REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/availability/week",
            get(availability::get_week).post(availability::post_week),
        )
        .route("/bookings", post(bookings::create).get(bookings::list))
        .route("/bookings/{id}", get(bookings::get_one))
        .route("/bookings/{id}/cancel", post(bookings::cancel))
        .route("/bookings/{id}/status", post(bookings::set_status))
        .layer(middleware::from_fn(observe))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bookings": state.engine.booking_count(),
    }))
}

/// One span plus RED metrics per request, keyed by the matched route.
async fn observe(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let started = Instant::now();

    let span = info_span!("http_request", %method, route = %route);
    let response = next.run(request).instrument(span).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(REQUESTS_TOTAL, "route" => route.clone(), "status" => status).increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "route" => route).record(started.elapsed().as_secs_f64());
    response
}
