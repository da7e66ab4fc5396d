use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;
use ulid::Ulid;

use crate::collaborators::price_services;
use crate::limits::*;
use crate::model::*;
use crate::notify::Notification;

use super::{Engine, EngineError};

/// A customer's request for an appointment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub customer_id: Ulid,
    pub vehicle_id: Ulid,
    pub service_ids: Vec<Ulid>,
    pub slot_start: Ms,
}

impl Engine {
    pub async fn create_booking(&self, req: NewBooking) -> Result<Booking, EngineError> {
        if req.service_ids.is_empty() {
            return Err(EngineError::InvalidInput("at least one service is required".into()));
        }
        if req.service_ids.len() > MAX_SERVICES_PER_BOOKING {
            return Err(EngineError::LimitExceeded("too many services on booking"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = req.service_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(EngineError::InvalidInput(format!("service {dup} requested twice")));
        }

        let valid: HashSet<Ulid> = self
            .deps
            .catalog
            .validate_service_ids(&req.service_ids)
            .await?
            .into_iter()
            .collect();
        let unknown: Vec<Ulid> = req
            .service_ids
            .iter()
            .copied()
            .filter(|id| !valid.contains(id))
            .collect();
        if !unknown.is_empty() {
            return Err(EngineError::UnknownServices(unknown));
        }

        if !self.calendar.is_aligned(req.slot_start) {
            return Err(EngineError::InvalidInput(format!(
                "slot must start on a {}-minute boundary",
                self.config.slot_minutes
            )));
        }
        let slot = self.calendar.slot_starting_at(req.slot_start).ok_or_else(|| {
            EngineError::InvalidInput("slot is outside business hours".into())
        })?;
        if slot.start <= self.now() {
            return Err(EngineError::InvalidInput("slot has already passed".into()));
        }

        if self
            .deps
            .vehicles
            .is_vehicle_in_active_workflow(req.vehicle_id)
            .await?
        {
            return Err(EngineError::VehicleBusy(req.vehicle_id));
        }

        // Capacity and one-booking-per-vehicle are checked and applied under one lock.
        let mut book = self.booked_slots.write().await;
        if self.active_vehicles.contains_key(&req.vehicle_id) {
            return Err(EngineError::VehicleBusy(req.vehicle_id));
        }
        let capacity = self.config.max_bookings_per_slot;
        if book.count_overlapping(&slot) >= capacity {
            return Err(EngineError::SlotUnavailable {
                start: slot.start,
                capacity,
            });
        }

        let booking = Booking {
            id: Ulid::new(),
            customer_id: req.customer_id,
            vehicle_id: req.vehicle_id,
            service_ids: req.service_ids,
            slot,
            status: BookingStatus::Booked,
            created_at: self.now(),
        };
        let pending = self
            .submit(Op::BookingCreated, vec![Record::Booking(booking.clone())])
            .await?;
        book.insert(booking.id, slot);
        self.active_vehicles.insert(booking.vehicle_id, booking.id);
        self.bookings
            .insert(booking.id, Arc::new(Mutex::new(booking.clone())));
        drop(book);
        pending.durable().await?;

        info!(booking = %booking.id, vehicle = %booking.vehicle_id, start = slot.start, "booking created");
        self.notify(Notification::BookingConfirmed {
            customer_id: booking.customer_id,
            booking_id: booking.id,
            slot,
        });
        Ok(booking)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let handle = self.booking_handle(id)?;
        let mut booking = handle.lock().await;
        if booking.status != BookingStatus::Booked {
            return Err(EngineError::conflict("booking", id, booking.status, "cancel"));
        }

        let mut next = booking.clone();
        next.status = BookingStatus::Cancelled;
        let mut book = self.booked_slots.write().await;
        let pending = self
            .submit(Op::BookingCancelled, vec![Record::Booking(next.clone())])
            .await?;
        book.remove(id);
        self.release_vehicle(next.vehicle_id, id);
        *booking = next.clone();
        drop(book);
        pending.durable().await?;

        info!(booking = %id, "booking cancelled");
        Ok(next)
    }

    /// Open a service order for a booked appointment, snapshotting current service prices.
    pub async fn check_in_booking(&self, staff_id: Ulid, id: Ulid) -> Result<ServiceOrder, EngineError> {
        let handle = self.booking_handle(id)?;
        let mut booking = handle.lock().await;
        if booking.status != BookingStatus::Booked {
            return Err(EngineError::conflict("booking", id, booking.status, "check in"));
        }
        if self.open_orders.contains_key(&id) {
            return Err(EngineError::AlreadyExists {
                entity: "service order",
                id,
            });
        }

        let priced = price_services(self.deps.catalog.as_ref(), &booking.service_ids).await?;
        let missing: Vec<Ulid> = booking
            .service_ids
            .iter()
            .copied()
            .filter(|sid| !priced.contains_key(sid))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::UnknownServices(missing));
        }
        let line_items = booking
            .service_ids
            .iter()
            .map(|sid| {
                let service = &priced[sid];
                LineItem {
                    kind: LineItemKind::Service { service_id: *sid },
                    description: service.name.clone(),
                    quantity: 1,
                    unit_price: service.price,
                }
            })
            .collect();

        let now = self.now();
        let order = ServiceOrder {
            id: Ulid::new(),
            booking_id: id,
            customer_id: booking.customer_id,
            vehicle_id: booking.vehicle_id,
            staff_id,
            line_items,
            status: OrderStatus::Created,
            created_at: now,
            completed_at: None,
            task_ids: Vec::new(),
        };
        let mut next = booking.clone();
        next.status = BookingStatus::InProgress;

        let pending = self
            .submit(
                Op::CheckedIn,
                vec![Record::Order(order.clone()), Record::Booking(next.clone())],
            )
            .await?;
        *booking = next;
        self.open_orders.insert(id, order.id);
        self.orders
            .insert(order.id, Arc::new(Mutex::new(order.clone())));
        pending.durable().await?;

        info!(booking = %id, order = %order.id, staff = %staff_id, "checked in");
        Ok(order)
    }
}
