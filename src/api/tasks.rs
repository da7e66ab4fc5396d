use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use ulid::Ulid;

use crate::collaborators::MediaDescriptor;
use crate::engine::{Engine, EngineError, NewTimelineEntry, TaskCompletion, TaskPlan};
use crate::model::{Task, TaskType};

use super::error::ApiError;
use super::timed;

/// Routes are split by task type; refuse ids of the other type.
async fn expect_type(engine: &Engine, id: Ulid, task_type: TaskType) -> Result<(), ApiError> {
    let task = engine.get_task(id).await?;
    if task.task_type() != task_type {
        return Err(EngineError::InvalidInput(format!(
            "task {id} is not a {} task",
            task_type.label()
        ))
        .into());
    }
    Ok(())
}

pub(super) async fn get(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(timed("get_task", engine.get_task(id)).await?))
}

pub(super) async fn schedule_inspection(
    State(engine): State<Arc<Engine>>,
    Path(order_id): Path<Ulid>,
    Json(plan): Json<TaskPlan>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(
        timed("schedule_inspection", engine.schedule_inspection(order_id, plan)).await?,
    ))
}

pub(super) async fn begin_inspection(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Task>, ApiError> {
    expect_type(&engine, id, TaskType::Inspection).await?;
    Ok(Json(timed("begin_task", engine.begin_task(id)).await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct InspectionReport {
    comment: Option<String>,
    #[serde(default)]
    media: Vec<MediaDescriptor>,
}

pub(super) async fn complete_inspection(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
    Json(report): Json<InspectionReport>,
) -> Result<Json<Task>, ApiError> {
    expect_type(&engine, id, TaskType::Inspection).await?;
    let completion = TaskCompletion::Inspection {
        comment: report.comment,
        media: report.media,
    };
    Ok(Json(
        timed("complete_task", engine.complete_task(id, completion)).await?,
    ))
}

pub(super) async fn schedule_servicing(
    State(engine): State<Arc<Engine>>,
    Path(order_id): Path<Ulid>,
    Json(plan): Json<TaskPlan>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(
        timed("schedule_servicing", engine.schedule_servicing(order_id, plan)).await?,
    ))
}

pub(super) async fn start_servicing(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Task>, ApiError> {
    expect_type(&engine, id, TaskType::Servicing).await?;
    Ok(Json(timed("begin_task", engine.begin_task(id)).await?))
}

pub(super) async fn complete_servicing(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Task>, ApiError> {
    expect_type(&engine, id, TaskType::Servicing).await?;
    Ok(Json(
        timed("complete_task", engine.complete_task(id, TaskCompletion::Servicing)).await?,
    ))
}

pub(super) async fn append_timeline(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
    Json(entry): Json<NewTimelineEntry>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(
        timed("append_timeline_entry", engine.append_timeline_entry(id, entry)).await?,
    ))
}
