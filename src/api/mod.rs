//! HTTP surface over the engine.

mod bays;
mod bookings;
pub mod error;
mod orders;
mod tasks;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, routing::get, routing::post};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::engine::{Engine, EngineError};
use crate::observability;

use self::error::ApiError;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/bookings", post(bookings::create))
        .route("/bookings/{id}", get(bookings::get))
        .route("/bookings/{id}/cancel", post(bookings::cancel))
        .route("/bookings/{id}/check-in", post(bookings::check_in))
        .route("/available-time-slots", get(bookings::available_time_slots))
        .route("/orders/{id}", get(orders::get))
        .route("/orders/{id}/tasks", get(orders::tasks))
        .route("/orders/{id}/line-items", post(orders::add_line_item))
        .route("/orders/{id}/request-approval", post(orders::request_approval))
        .route("/orders/{id}/approve", post(orders::approve))
        .route("/orders/{id}/cancel", post(orders::cancel))
        .route("/tasks/{id}", get(tasks::get))
        .route("/tasks/inspection/{id}/schedule", post(tasks::schedule_inspection))
        .route("/tasks/inspection/{id}/begin", post(tasks::begin_inspection))
        .route("/tasks/inspection/{id}/complete", post(tasks::complete_inspection))
        .route("/tasks/servicing/{id}/schedule", post(tasks::schedule_servicing))
        .route("/tasks/servicing/{id}/start", post(tasks::start_servicing))
        .route("/tasks/servicing/{id}/complete", post(tasks::complete_servicing))
        .route("/tasks/servicing/{id}/timeline", post(tasks::append_timeline))
        .route("/bays", get(bays::list).post(bays::create))
        .route("/bays/{id}/schedule", get(bays::schedule))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Run one engine call, recording its outcome and latency.
pub(crate) async fn timed<T>(
    op: &'static str,
    call: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, ApiError> {
    let started = Instant::now();
    let result = call.await;
    observability::record(op, started, &result);
    result.map_err(ApiError::from)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    bays: usize,
}

async fn health(State(engine): State<Arc<Engine>>) -> Json<Health> {
    Json(Health {
        status: if engine.storage_failed() { "read_only" } else { "ok" },
        bays: engine.list_bays().await.len(),
    })
}
