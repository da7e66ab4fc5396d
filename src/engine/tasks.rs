use serde::Deserialize;
use tracing::info;
use ulid::Ulid;

use crate::collaborators::MediaDescriptor;
use crate::limits::*;
use crate::model::*;
use crate::notify::Notification;

use super::conflict::{validate_media, validate_text};
use super::orders::advance;
use super::{Engine, EngineError};

/// What a technician hands in when finishing a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCompletion {
    Inspection {
        comment: Option<String>,
        #[serde(default)]
        media: Vec<MediaDescriptor>,
    },
    Servicing,
}

impl TaskCompletion {
    fn task_type(&self) -> TaskType {
        match self {
            TaskCompletion::Inspection { .. } => TaskType::Inspection,
            TaskCompletion::Servicing => TaskType::Servicing,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTimelineEntry {
    pub title: String,
    pub comment: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaDescriptor>,
}

impl Engine {
    /// Order id of a task. Fails with not-found before any state is looked at.
    pub(super) async fn order_of(&self, task_id: Ulid) -> Result<Ulid, EngineError> {
        let task = self.task_handle(task_id)?;
        let order_id = task.lock().await.service_order_id;
        Ok(order_id)
    }

    /// scheduled → in_progress. A servicing start also moves its order to `servicing`.
    pub async fn begin_task(&self, task_id: Ulid) -> Result<Task, EngineError> {
        let order_id = self.order_of(task_id).await?;
        let order_handle = self.order_handle(order_id)?;
        let mut order = order_handle.lock().await;
        let task_handle = self.task_handle(task_id)?;
        let mut task = task_handle.lock().await;

        if task.status != TaskStatus::Scheduled {
            return Err(EngineError::conflict("task", task_id, task.status, "begin"));
        }
        let now = self.now();
        let mut next_order = order.clone();
        match task.task_type() {
            TaskType::Inspection => {
                if order.status != OrderStatus::WaitingInspection {
                    return Err(EngineError::conflict(
                        "service order",
                        order_id,
                        order.status,
                        "begin inspection for",
                    ));
                }
            }
            TaskType::Servicing => advance(&mut next_order, OrderStatus::Servicing, "begin servicing for", now)?,
        }

        let mut next = task.clone();
        next.status = TaskStatus::InProgress;
        next.actual_start = Some(now);
        let mut records = vec![Record::Task(next.clone())];
        if next_order.status != order.status {
            records.push(Record::Order(next_order.clone()));
        }
        let pending = self.submit(Op::TaskStarted, records).await?;
        *task = next.clone();
        *order = next_order;
        drop(task);
        drop(order);
        pending.durable().await?;

        info!(task = %task_id, kind = next.task_type().label(), "task started");
        Ok(next)
    }

    /// in_progress → completed. Inspection moves the order to `inspection_completed`;
    /// servicing completes the order and its booking.
    pub async fn complete_task(&self, task_id: Ulid, completion: TaskCompletion) -> Result<Task, EngineError> {
        let order_id = self.order_of(task_id).await?;
        let order_handle = self.order_handle(order_id)?;
        let mut order = order_handle.lock().await;
        let task_handle = self.task_handle(task_id)?;
        let mut task = task_handle.lock().await;

        if task.status != TaskStatus::InProgress {
            return Err(EngineError::conflict("task", task_id, task.status, "complete"));
        }
        if completion.task_type() != task.task_type() {
            return Err(EngineError::InvalidInput(format!(
                "task {task_id} is a {} task",
                task.task_type().label()
            )));
        }

        let now = self.now();
        let mut next = task.clone();
        next.status = TaskStatus::Completed;
        next.actual_end = Some(now);
        let mut next_order = order.clone();

        let (pending, completed_order) = match completion {
            TaskCompletion::Inspection { comment, media } => {
                if let Some(c) = &comment {
                    validate_text("comment", c, MAX_TEXT_LEN)?;
                }
                validate_media(&media)?;
                advance(&mut next_order, OrderStatus::InspectionCompleted, "complete inspection for", now)?;
                let media_ids = if media.is_empty() {
                    Vec::new()
                } else {
                    self.deps.media.persist(&media).await?
                };
                next.detail = TaskDetail::Inspection {
                    comment,
                    media: media_ids,
                };

                let pending = self
                    .submit(
                        Op::TaskCompleted,
                        vec![Record::Task(next.clone()), Record::Order(next_order.clone())],
                    )
                    .await?;
                *task = next.clone();
                *order = next_order;
                (pending, None)
            }
            TaskCompletion::Servicing => {
                advance(&mut next_order, OrderStatus::Completed, "complete servicing for", now)?;
                let booking_handle = self.booking_handle(order.booking_id)?;
                let mut booking = booking_handle.lock().await;
                let mut next_booking = booking.clone();
                next_booking.status = BookingStatus::Completed;

                let pending = self
                    .submit(
                        Op::TaskCompleted,
                        vec![
                            Record::Task(next.clone()),
                            Record::Order(next_order.clone()),
                            Record::Booking(next_booking.clone()),
                        ],
                    )
                    .await?;
                *task = next.clone();
                self.release_vehicle(next_booking.vehicle_id, next_booking.id);
                self.open_orders.remove(&next_booking.id);
                *booking = next_booking;
                *order = next_order.clone();
                (pending, Some(next_order))
            }
        };
        self.reminded.remove(&task_id);
        drop(task);
        drop(order);
        pending.durable().await?;

        if let Some(done) = completed_order {
            info!(order = %order_id, "order completed");
            self.notify(Notification::OrderCompleted {
                customer_id: done.customer_id,
                order_id,
                total: done.total(),
            });
        }
        info!(task = %task_id, kind = next.task_type().label(), "task completed");
        Ok(next)
    }

    /// Record progress on a servicing task that hasn't finished.
    pub async fn append_timeline_entry(&self, task_id: Ulid, entry: NewTimelineEntry) -> Result<Task, EngineError> {
        let handle = self.task_handle(task_id)?;
        let mut task = handle.lock().await;

        let TaskDetail::Servicing { timeline } = &task.detail else {
            return Err(EngineError::InvalidInput(format!(
                "task {task_id} is not a servicing task"
            )));
        };
        if !task.status.is_active() {
            return Err(EngineError::conflict("task", task_id, task.status, "add a timeline entry to"));
        }
        if timeline.len() >= MAX_TIMELINE_ENTRIES {
            return Err(EngineError::LimitExceeded("timeline is full"));
        }
        if entry.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("timeline entry needs a title".into()));
        }
        validate_text("title", &entry.title, MAX_NAME_LEN)?;
        if let Some(c) = &entry.comment {
            validate_text("comment", c, MAX_TEXT_LEN)?;
        }
        validate_media(&entry.media)?;

        let media = if entry.media.is_empty() {
            Vec::new()
        } else {
            self.deps.media.persist(&entry.media).await?
        };
        let mut next = task.clone();
        if let TaskDetail::Servicing { timeline } = &mut next.detail {
            timeline.push(TimelineEntry {
                title: entry.title,
                comment: entry.comment,
                media,
                at: self.now(),
            });
        }
        let pending = self
            .submit(Op::TimelineAppended, vec![Record::Task(next.clone())])
            .await?;
        *task = next.clone();
        drop(task);
        pending.durable().await?;
        Ok(next)
    }
}
