use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use ulid::Ulid;

use crate::engine::{Engine, NewBooking};
use crate::model::{Booking, ServiceOrder, SlotAvailability};

use super::error::ApiError;
use super::timed;

pub(super) async fn create(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = timed("create_booking", engine.create_booking(req)).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub(super) async fn get(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(timed("get_booking", engine.get_booking(id)).await?))
}

pub(super) async fn cancel(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(timed("cancel_booking", engine.cancel_booking(id)).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CheckIn {
    staff_id: Ulid,
}

pub(super) async fn check_in(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
    Json(body): Json<CheckIn>,
) -> Result<Json<ServiceOrder>, ApiError> {
    Ok(Json(
        timed("check_in_booking", engine.check_in_booking(body.staff_id, id)).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct Day {
    day: u32,
    month: u32,
    year: i32,
}

pub(super) async fn available_time_slots(
    State(engine): State<Arc<Engine>>,
    Query(day): Query<Day>,
) -> Result<Json<Vec<SlotAvailability>>, ApiError> {
    Ok(Json(
        timed(
            "available_time_slots",
            engine.available_time_slots(day.year, day.month, day.day),
        )
        .await?,
    ))
}
