use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Ms, Span};

const CHANNEL_CAPACITY: usize = 256;

/// Customer-facing events the engine emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    BookingConfirmed {
        customer_id: Ulid,
        booking_id: Ulid,
        slot: Span,
    },
    TaskAlmostDue {
        customer_id: Ulid,
        task_id: Ulid,
        expected_end: Ms,
    },
    TaskRescheduled {
        customer_id: Ulid,
        task_id: Ulid,
        bay_id: Ulid,
        window: Span,
    },
    OrderCompleted {
        customer_id: Ulid,
        order_id: Ulid,
        total: u64,
    },
}

impl Notification {
    pub fn customer_id(&self) -> Ulid {
        match self {
            Notification::BookingConfirmed { customer_id, .. }
            | Notification::TaskAlmostDue { customer_id, .. }
            | Notification::TaskRescheduled { customer_id, .. }
            | Notification::OrderCompleted { customer_id, .. } => *customer_id,
        }
    }
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Fire-and-forget delivery. The engine logs failures and carries on.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Broadcast hub fanning notifications out per customer.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a customer's notifications. Creates the channel if needed.
    pub fn subscribe(&self, customer_id: Ulid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(customer_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    pub fn remove(&self, customer_id: &Ulid) {
        self.channels.remove(customer_id);
    }
}

impl NotificationSink for NotifyHub {
    /// No-op if nobody is listening.
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(sender) = self.channels.get(&notification.customer_id()) {
            let _ = sender.send(notification.clone());
        }
        Ok(())
    }
}
