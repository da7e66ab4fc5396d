use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use ulid::Ulid;

use crate::engine::Engine;
use crate::model::{Bay, BaySchedule};

use super::error::ApiError;
use super::timed;

pub(super) async fn list(State(engine): State<Arc<Engine>>) -> Json<Vec<Bay>> {
    Json(engine.list_bays().await)
}

#[derive(Debug, Deserialize)]
pub(super) struct NewBay {
    name: String,
}

pub(super) async fn create(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<NewBay>,
) -> Result<(StatusCode, Json<Bay>), ApiError> {
    let bay = timed("add_bay", engine.add_bay(&body.name)).await?;
    Ok((StatusCode::CREATED, Json(bay)))
}

pub(super) async fn schedule(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<BaySchedule>, ApiError> {
    Ok(Json(timed("bay_schedule", engine.bay_schedule(id)).await?))
}
