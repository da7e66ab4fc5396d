use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::selection::BayCandidate;

use super::conflict::{earliest_clash_end, first_clash, validate_duration, validate_technicians};
use super::orders::advance;
use super::{Engine, EngineError};

/// Who works a task and how long it should take.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub technicians: Vec<TechnicianAssignment>,
    pub expected_duration_in_minutes: u32,
}

impl Engine {
    pub async fn add_bay(&self, name: &str) -> Result<Bay, EngineError> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("bay name must be 1..=256 bytes".into()));
        }
        if self.bays.len() >= MAX_BAYS {
            return Err(EngineError::LimitExceeded("too many bays"));
        }
        let bay = Bay {
            id: Ulid::new(),
            name: name.to_string(),
        };
        let pending = self.submit(Op::BayAdded, vec![Record::Bay(bay.clone())]).await?;
        self.bays
            .insert(bay.id, Arc::new(RwLock::new(BayState::new(bay.clone()))));
        pending.durable().await?;
        info!(bay = %bay.id, name = %bay.name, "bay added");
        Ok(bay)
    }

    /// created → waiting_inspection, reserving a bay for the inspection.
    pub async fn schedule_inspection(&self, order_id: Ulid, plan: TaskPlan) -> Result<Task, EngineError> {
        self.schedule_task(order_id, TaskType::Inspection, plan, &CancellationToken::new())
            .await
    }

    /// inspection_completed | approved → scheduled, reserving a bay for the servicing.
    pub async fn schedule_servicing(&self, order_id: Ulid, plan: TaskPlan) -> Result<Task, EngineError> {
        self.schedule_task(order_id, TaskType::Servicing, plan, &CancellationToken::new())
            .await
    }

    /// Reserve the earliest free bay window for a new task and advance its order.
    /// Cancelling `cancel` before the reservation commits leaves nothing behind.
    pub async fn schedule_task(
        &self,
        order_id: Ulid,
        task_type: TaskType,
        plan: TaskPlan,
        cancel: &CancellationToken,
    ) -> Result<Task, EngineError> {
        validate_technicians(&plan.technicians)?;
        let duration = validate_duration(plan.expected_duration_in_minutes)?;

        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock().await;
        let target = match task_type {
            TaskType::Inspection => OrderStatus::WaitingInspection,
            TaskType::Servicing => OrderStatus::Scheduled,
        };
        let action = match task_type {
            TaskType::Inspection => "schedule inspection for",
            TaskType::Servicing => "schedule servicing for",
        };
        let mut next_order = order.clone();
        advance(&mut next_order, target, action, self.now())?;

        for task_id in &order.task_ids {
            let task = self.task_handle(*task_id)?;
            let task = task.lock().await;
            if task.task_type() == task_type && task.status.is_active() {
                return Err(EngineError::conflict("service order", order_id, order.status, action));
            }
        }

        loop {
            let (bay_id, window) = self.find_window(duration, None, cancel).await?;
            let bay = self.bay_handle(bay_id)?;
            let mut bay = bay.write().await;
            if let Some(clash) = first_clash(&bay, &window, None) {
                // Someone reserved the window between search and lock.
                metrics::counter!(crate::observability::SCHEDULER_RETRIES_TOTAL).increment(1);
                debug!(bay = %bay_id, clash = %clash.task_id, "window taken, searching again");
                continue;
            }
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let task = Task {
                id: Ulid::new(),
                service_order_id: order_id,
                bay_id,
                expected: window,
                actual_start: None,
                actual_end: None,
                status: TaskStatus::Scheduled,
                technicians: plan.technicians,
                detail: TaskDetail::empty(task_type),
            };
            next_order.task_ids.push(task.id);
            let pending = self
                .submit(
                    Op::TaskScheduled,
                    vec![Record::Task(task.clone()), Record::Order(next_order.clone())],
                )
                .await?;
            bay.reserve(Reservation {
                task_id: task.id,
                span: window,
            });
            self.tasks
                .insert(task.id, Arc::new(Mutex::new(task.clone())));
            *order = next_order;
            drop(bay);
            pending.durable().await?;

            info!(
                task = %task.id,
                order = %order_id,
                kind = task_type.label(),
                bay = %bay_id,
                start = window.start,
                end = window.end,
                "task scheduled"
            );
            return Ok(task);
        }
    }

    /// Greedy earliest-fit: scan forward from now for the first window of `duration`
    /// that some bay has entirely free, jumping to just past the earliest clashing end
    /// each time every bay is busy.
    pub(super) async fn find_window(
        &self,
        duration: Ms,
        exclude: Option<Ulid>,
        cancel: &CancellationToken,
    ) -> Result<(Ulid, Span), EngineError> {
        let now = self.now();
        let horizon = now + self.config.lookahead;
        let load_window = Span::new(now, horizon + duration);
        let bays = self.bay_handles();
        let exhausted = || {
            metrics::counter!(crate::observability::SCHEDULER_EXHAUSTED_TOTAL).increment(1);
            EngineError::BaysUnavailable {
                horizon_ms: self.config.lookahead,
            }
        };
        if bays.is_empty() {
            return Err(exhausted());
        }

        let mut start = now;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if start > horizon {
                return Err(exhausted());
            }
            let window = Span::starting_at(start, duration);

            let mut candidates = Vec::new();
            let mut next_start: Option<Ms> = None;
            for (bay_id, bay) in &bays {
                let bay = bay.read().await;
                match earliest_clash_end(&bay, &window, exclude) {
                    Some(end) => next_start = Some(next_start.map_or(end, |s| s.min(end))),
                    None => candidates.push(BayCandidate {
                        bay_id: *bay_id,
                        reserved_ms: bay.reserved_within(&load_window),
                    }),
                }
            }

            if !candidates.is_empty() {
                let pick = self.deps.selector.select(&candidates).min(candidates.len() - 1);
                return Ok((candidates[pick].bay_id, window));
            }
            // Every bay clashed, so next_start is set and lies past `start`.
            start = next_start.unwrap_or(horizon) + self.config.retry_gap;
        }
    }
}
