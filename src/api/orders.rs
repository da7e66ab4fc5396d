use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use ulid::Ulid;

use crate::engine::{Engine, NewLineItem};
use crate::model::{ServiceOrder, Task};

use super::error::ApiError;
use super::timed;

pub(super) async fn get(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ServiceOrder>, ApiError> {
    Ok(Json(timed("get_order", engine.get_order(id)).await?))
}

pub(super) async fn tasks(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(timed("tasks_for_order", engine.tasks_for_order(id)).await?))
}

pub(super) async fn add_line_item(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
    Json(item): Json<NewLineItem>,
) -> Result<Json<ServiceOrder>, ApiError> {
    Ok(Json(timed("add_line_item", engine.add_line_item(id, item)).await?))
}

pub(super) async fn request_approval(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ServiceOrder>, ApiError> {
    Ok(Json(
        timed("request_customer_approval", engine.request_customer_approval(id)).await?,
    ))
}

pub(super) async fn approve(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ServiceOrder>, ApiError> {
    Ok(Json(timed("approve_order", engine.approve_order(id)).await?))
}

pub(super) async fn cancel(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ServiceOrder>, ApiError> {
    Ok(Json(timed("cancel_order", engine.cancel_order(id)).await?))
}
