use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let handle = self.booking_handle(id)?;
        let booking = handle.lock().await;
        Ok(booking.clone())
    }

    pub async fn get_order(&self, id: Ulid) -> Result<ServiceOrder, EngineError> {
        let handle = self.order_handle(id)?;
        let order = handle.lock().await;
        Ok(order.clone())
    }

    pub async fn get_task(&self, id: Ulid) -> Result<Task, EngineError> {
        let handle = self.task_handle(id)?;
        let task = handle.lock().await;
        Ok(task.clone())
    }

    /// Id of the booking's open service order, if it has been checked in and not closed.
    pub fn open_order_for_booking(&self, booking_id: Ulid) -> Option<Ulid> {
        self.open_orders.get(&booking_id).map(|e| *e.value())
    }

    /// Every task an order has scheduled, in scheduling order.
    pub async fn tasks_for_order(&self, order_id: Ulid) -> Result<Vec<Task>, EngineError> {
        let task_ids = {
            let handle = self.order_handle(order_id)?;
            let order = handle.lock().await;
            order.task_ids.clone()
        };
        let mut tasks = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            tasks.push(self.get_task(id).await?);
        }
        Ok(tasks)
    }

    pub async fn list_bays(&self) -> Vec<Bay> {
        let mut bays = Vec::new();
        for (_, handle) in self.bay_handles() {
            bays.push(handle.read().await.bay.clone());
        }
        bays
    }

    pub async fn bay_schedule(&self, bay_id: Ulid) -> Result<BaySchedule, EngineError> {
        let handle = self.bay_handle(bay_id)?;
        let bay = handle.read().await;
        Ok(BaySchedule {
            bay: bay.bay.clone(),
            reservations: bay.reservations.clone(),
        })
    }
}
