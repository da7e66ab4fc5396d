use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::notify::Notification;

use super::conflict::first_clash;
use super::{Engine, EngineError, Shared};

/// Outcome of trying to move one overrunning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
    Moved { bay_id: Ulid, window: Span },
    /// The task finished or stopped overrunning before its lock was taken.
    Skipped,
}

fn is_overdue(task: &Task, now: Ms) -> bool {
    task.status == TaskStatus::InProgress && task.expected.end < now
}

impl Engine {
    fn task_handles(&self) -> Vec<Shared<Task>> {
        self.tasks.iter().map(|e| e.value().clone()).collect()
    }

    /// In-progress tasks whose expected end has passed, oldest id first.
    pub async fn overdue_tasks(&self, now: Ms) -> Vec<Ulid> {
        let mut overdue = Vec::new();
        for handle in self.task_handles() {
            let task = handle.lock().await;
            if is_overdue(&task, now) {
                overdue.push(task.id);
            }
        }
        overdue.sort();
        overdue
    }

    /// Move an overrunning task to the earliest free window from now, on any bay.
    /// Its own current reservation doesn't count as a clash.
    pub async fn relocate_task(&self, task_id: Ulid) -> Result<Relocation, EngineError> {
        let order_id = self.order_of(task_id).await?;
        let customer_id = self.order_handle(order_id)?.lock().await.customer_id;

        let handle = self.task_handle(task_id)?;
        let mut task = handle.lock().await;
        let cancel = CancellationToken::new();

        loop {
            if !is_overdue(&task, self.now()) {
                debug!(task = %task_id, status = ?task.status, "no longer overdue, skipping");
                return Ok(Relocation::Skipped);
            }
            let duration = task.expected.duration_ms();
            let (bay_id, window) = self.find_window(duration, Some(task_id), &cancel).await?;

            let mut next = task.clone();
            next.bay_id = bay_id;
            next.expected = window;
            let reservation = Reservation {
                task_id,
                span: window,
            };

            let new_handle = self.bay_handle(bay_id)?;
            let pending = if bay_id == task.bay_id {
                let mut bay = new_handle.write().await;
                if first_clash(&bay, &window, Some(task_id)).is_some() {
                    metrics::counter!(crate::observability::SCHEDULER_RETRIES_TOTAL).increment(1);
                    continue;
                }
                let pending = self
                    .submit(Op::TaskRelocated, vec![Record::Task(next.clone())])
                    .await?;
                bay.release(task_id);
                bay.reserve(reservation);
                pending
            } else {
                let old_handle = self.bay_handle(task.bay_id)?;
                let old_first = task.bay_id < bay_id;
                let (a, b) = if old_first {
                    (&old_handle, &new_handle)
                } else {
                    (&new_handle, &old_handle)
                };
                let mut ga = a.write().await;
                let mut gb = b.write().await;
                let (old_bay, new_bay): (&mut BayState, &mut BayState) = if old_first {
                    (&mut *ga, &mut *gb)
                } else {
                    (&mut *gb, &mut *ga)
                };
                if first_clash(new_bay, &window, Some(task_id)).is_some() {
                    metrics::counter!(crate::observability::SCHEDULER_RETRIES_TOTAL).increment(1);
                    continue;
                }
                let pending = self
                    .submit(Op::TaskRelocated, vec![Record::Task(next.clone())])
                    .await?;
                old_bay.release(task_id);
                new_bay.reserve(reservation);
                pending
            };

            let from = task.expected;
            *task = next;
            self.reminded.remove(&task_id);
            drop(task);
            pending.durable().await?;
            metrics::counter!(crate::observability::TASKS_RELOCATED_TOTAL).increment(1);
            info!(
                task = %task_id,
                bay = %bay_id,
                old_end = from.end,
                start = window.start,
                end = window.end,
                "overrunning task relocated"
            );
            self.notify(Notification::TaskRescheduled {
                customer_id,
                task_id,
                bay_id,
                window,
            });
            return Ok(Relocation::Moved { bay_id, window });
        }
    }

    /// Warn customers once about in-progress tasks ending within the configured lead time.
    /// Returns how many reminders went out.
    pub async fn remind_almost_due(&self, now: Ms) -> usize {
        let lead = self.config.almost_due_lead;
        let mut due = Vec::new();
        for handle in self.task_handles() {
            let task = handle.lock().await;
            if task.status == TaskStatus::InProgress
                && task.expected.end > now
                && task.expected.end <= now + lead
                && !self.reminded.contains(&task.id)
            {
                due.push((task.id, task.service_order_id, task.expected.end));
            }
        }

        let mut sent = 0;
        for (task_id, order_id, expected_end) in due {
            let Ok(order) = self.order_handle(order_id) else {
                continue;
            };
            let customer_id = order.lock().await.customer_id;
            if self.reminded.insert(task_id) {
                self.notify(Notification::TaskAlmostDue {
                    customer_id,
                    task_id,
                    expected_end,
                });
                sent += 1;
            }
        }
        sent
    }
}
