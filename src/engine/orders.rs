use serde::Deserialize;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_text;
use super::{Engine, EngineError};

/// Move `order` along one edge of the lifecycle graph, or refuse without touching it.
pub(super) fn advance(
    order: &mut ServiceOrder,
    next: OrderStatus,
    action: &'static str,
    now: Ms,
) -> Result<(), EngineError> {
    if !order.status.can_transition_to(next) {
        return Err(EngineError::conflict("service order", order.id, order.status, action));
    }
    order.status = next;
    if next == OrderStatus::Completed {
        order.completed_at = Some(now);
    }
    Ok(())
}

/// A priced line added to an open order (parts, labour, or an extra service).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLineItem {
    pub kind: LineItemKind,
    pub description: String,
    pub quantity: u32,
    pub unit_price: u64,
}

impl Engine {
    /// inspection_completed → waiting_customer_approval
    pub async fn request_customer_approval(&self, order_id: Ulid) -> Result<ServiceOrder, EngineError> {
        self.set_order_status(order_id, OrderStatus::WaitingCustomerApproval, "request approval for")
            .await
    }

    /// waiting_customer_approval → approved
    pub async fn approve_order(&self, order_id: Ulid) -> Result<ServiceOrder, EngineError> {
        self.set_order_status(order_id, OrderStatus::Approved, "approve").await
    }

    async fn set_order_status(
        &self,
        order_id: Ulid,
        status: OrderStatus,
        action: &'static str,
    ) -> Result<ServiceOrder, EngineError> {
        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock().await;
        let mut next = order.clone();
        advance(&mut next, status, action, self.now())?;
        let pending = self
            .submit(Op::OrderStatusChanged, vec![Record::Order(next.clone())])
            .await?;
        *order = next.clone();
        drop(order);
        pending.durable().await?;
        info!(order = %order_id, status = ?status, "order status changed");
        Ok(next)
    }

    pub async fn add_line_item(&self, order_id: Ulid, item: NewLineItem) -> Result<ServiceOrder, EngineError> {
        if item.description.trim().is_empty() {
            return Err(EngineError::InvalidInput("line item needs a description".into()));
        }
        validate_text("description", &item.description, MAX_NAME_LEN)?;
        if item.quantity == 0 || item.quantity > MAX_LINE_QUANTITY {
            return Err(EngineError::InvalidInput(format!(
                "quantity must be between 1 and {MAX_LINE_QUANTITY}"
            )));
        }
        if item.unit_price > MAX_UNIT_PRICE {
            return Err(EngineError::InvalidInput(format!(
                "unit price must not exceed {MAX_UNIT_PRICE}"
            )));
        }

        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock().await;
        if order.status.is_terminal() || order.status == OrderStatus::Servicing {
            return Err(EngineError::conflict("service order", order_id, order.status, "add a line item to"));
        }
        if order.line_items.len() >= MAX_LINE_ITEMS {
            return Err(EngineError::LimitExceeded("too many line items on order"));
        }

        let mut next = order.clone();
        next.line_items.push(LineItem {
            kind: item.kind,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
        });
        let pending = self
            .submit(Op::LineItemAdded, vec![Record::Order(next.clone())])
            .await?;
        *order = next.clone();
        drop(order);
        pending.durable().await?;
        Ok(next)
    }

    /// Cancel an open order: its unfinished tasks give their bay time back and its booking closes.
    pub async fn cancel_order(&self, order_id: Ulid) -> Result<ServiceOrder, EngineError> {
        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock().await;
        let now = self.now();
        let mut next = order.clone();
        advance(&mut next, OrderStatus::Cancelled, "cancel", now)?;

        let mut task_guards = Vec::new();
        for task_id in &order.task_ids {
            let task = self.task_handle(*task_id)?;
            task_guards.push(task.lock_owned().await);
        }
        let mut cancelled_tasks = Vec::new();
        for guard in &task_guards {
            if guard.status.is_active() {
                let mut t: Task = (**guard).clone();
                t.status = TaskStatus::Cancelled;
                cancelled_tasks.push(t);
            }
        }

        let mut bay_ids: Vec<Ulid> = cancelled_tasks.iter().map(|t| t.bay_id).collect();
        bay_ids.sort();
        bay_ids.dedup();
        let mut bays: Vec<OwnedRwLockWriteGuard<BayState>> = Vec::with_capacity(bay_ids.len());
        for bay_id in bay_ids {
            if let Ok(bay) = self.bay_handle(bay_id) {
                bays.push(bay.write_owned().await);
            }
        }

        let booking_handle = self.booking_handle(order.booking_id)?;
        let mut booking = booking_handle.lock().await;
        let mut next_booking = booking.clone();
        next_booking.status = BookingStatus::Cancelled;

        let mut records = vec![Record::Order(next.clone())];
        records.extend(cancelled_tasks.iter().cloned().map(Record::Task));
        records.push(Record::Booking(next_booking.clone()));

        let mut book = self.booked_slots.write().await;
        let pending = self.submit(Op::OrderCancelled, records).await?;
        book.remove(next_booking.id);
        drop(book);

        for t in &cancelled_tasks {
            if let Some(bay) = bays.iter_mut().find(|b| b.bay.id == t.bay_id) {
                bay.release(t.id);
            }
            self.reminded.remove(&t.id);
        }
        drop(bays);
        for guard in task_guards.iter_mut() {
            if let Some(t) = cancelled_tasks.iter().find(|t| t.id == guard.id) {
                **guard = t.clone();
            }
        }
        self.release_vehicle(next_booking.vehicle_id, next_booking.id);
        *booking = next_booking;
        self.open_orders.remove(&next.booking_id);
        *order = next.clone();
        drop(task_guards);
        drop(booking);
        drop(order);
        pending.durable().await?;

        info!(order = %order_id, tasks = cancelled_tasks.len(), "order cancelled");
        Ok(next)
    }
}
