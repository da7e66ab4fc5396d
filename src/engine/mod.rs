mod bookings;
mod conflict;
mod error;
mod orders;
mod queries;
mod recovery;
mod scheduler;
mod slots;
mod tasks;

pub use bookings::NewBooking;
pub use error::{EngineError, ErrorKind};
pub use orders::NewLineItem;
pub use recovery::Relocation;
pub use scheduler::TaskPlan;
pub use slots::SlotBook;
pub use tasks::{NewTimelineEntry, TaskCompletion};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::warn;
use ulid::Ulid;

use crate::calendar::ShopCalendar;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    IdleVehicleRegistry, InMemoryMediaStore, MediaStore, ServiceCatalog, VehicleRegistry,
};
use crate::config::ShopConfig;
use crate::model::*;
use crate::notify::{Notification, NotificationSink, NotifyHub};
use crate::selection::{BaySelector, LeastUtilized};
use crate::wal::Wal;

pub type Shared<T> = Arc<Mutex<T>>;
pub type SharedBay = Arc<RwLock<BayState>>;

/// Records per entry when compaction rewrites the log.
const SNAPSHOT_CHUNK: usize = 512;
/// Serialized bytes per snapshot entry, well under [`crate::wal::MAX_ENTRY_BYTES`].
const SNAPSHOT_CHUNK_BYTES: u64 = 16 * 1024 * 1024;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        at: Ms,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// wait for one append, drain whatever else is already queued, fsync once, answer everyone.
/// A failed flush raises `failed` before any caller hears about it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>, failed: Arc<AtomicBool>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other, &failed);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            mark_failed(&failed, e);
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd, &failed);
        }
    }
}

fn mark_failed(failed: &AtomicBool, e: &io::Error) {
    if !failed.swap(true, Ordering::AcqRel) {
        tracing::error!(error = %e, "WAL flush failed; refusing further writes until restart");
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't bleed into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand, failed: &AtomicBool) {
    match cmd {
        WalCommand::Compact { at, response } => {
            let result = Wal::replay(wal.path()).and_then(|events| {
                let snapshot = snapshot_events(fold_records(events), at);
                wal.compact(&snapshot)
            });
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            if let Err(e) = &result {
                mark_failed(failed, e);
            }
            let _ = response.send(result);
        }
    }
}

/// Latest snapshot of every entity, in dependency order: bays, bookings, orders, tasks.
#[derive(Default)]
struct Folded {
    bays: HashMap<Ulid, Bay>,
    bookings: HashMap<Ulid, Booking>,
    orders: HashMap<Ulid, ServiceOrder>,
    tasks: HashMap<Ulid, Task>,
}

fn fold_records(events: Vec<Event>) -> Folded {
    let mut folded = Folded::default();
    for event in events {
        for record in event.records {
            match record {
                Record::Bay(b) => {
                    folded.bays.insert(b.id, b);
                }
                Record::Booking(b) => {
                    folded.bookings.insert(b.id, b);
                }
                Record::Order(o) => {
                    folded.orders.insert(o.id, o);
                }
                Record::Task(t) => {
                    folded.tasks.insert(t.id, t);
                }
            }
        }
    }
    folded
}

fn snapshot_events(folded: Folded, at: Ms) -> Vec<Event> {
    let mut records: Vec<Record> = Vec::new();
    records.extend(folded.bays.into_values().map(Record::Bay));
    records.extend(folded.bookings.into_values().map(Record::Booking));
    records.extend(folded.orders.into_values().map(Record::Order));
    records.extend(folded.tasks.into_values().map(Record::Task));

    let mut events = Vec::new();
    let mut chunk = Vec::new();
    let mut chunk_bytes = 0u64;
    for record in records {
        let size = bincode::serialized_size(&record).unwrap_or(SNAPSHOT_CHUNK_BYTES);
        if !chunk.is_empty()
            && (chunk.len() >= SNAPSHOT_CHUNK || chunk_bytes + size > SNAPSHOT_CHUNK_BYTES)
        {
            events.push(Event::new(Op::Snapshot, at, std::mem::take(&mut chunk)));
            chunk_bytes = 0;
        }
        chunk_bytes += size;
        chunk.push(record);
    }
    if !chunk.is_empty() {
        events.push(Event::new(Op::Snapshot, at, chunk));
    }
    events
}

/// A queued WAL entry whose flush outcome is still unknown.
#[must_use = "wait on `durable` after applying the change"]
pub(super) struct Pending(oneshot::Receiver<io::Result<()>>);

impl Pending {
    pub(super) async fn durable(self) -> Result<(), EngineError> {
        self.0
            .await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}

// ── Collaborators ───────────────────────────────────────

/// Everything the engine talks to but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ServiceCatalog>,
    pub vehicles: Arc<dyn VehicleRegistry>,
    pub media: Arc<dyn MediaStore>,
    pub notifier: Arc<dyn NotificationSink>,
    pub selector: Arc<dyn BaySelector>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(catalog: Arc<dyn ServiceCatalog>) -> Self {
        Self {
            catalog,
            vehicles: Arc::new(IdleVehicleRegistry),
            media: Arc::new(InMemoryMediaStore::default()),
            notifier: Arc::new(NotifyHub::new()),
            selector: Arc::new(LeastUtilized),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_vehicles(mut self, vehicles: Arc<dyn VehicleRegistry>) -> Self {
        self.vehicles = vehicles;
        self
    }

    pub fn with_media(mut self, media: Arc<dyn MediaStore>) -> Self {
        self.media = media;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn BaySelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

// ── Engine ──────────────────────────────────────────────

pub struct Engine {
    pub config: ShopConfig,
    pub calendar: ShopCalendar,
    pub(super) deps: Collaborators,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Raised by the WAL writer when a flush fails; writes are refused from then on.
    pub(super) storage_failed: Arc<AtomicBool>,
    pub(super) bays: DashMap<Ulid, SharedBay>,
    pub(super) bookings: DashMap<Ulid, Shared<Booking>>,
    pub(super) orders: DashMap<Ulid, Shared<ServiceOrder>>,
    pub(super) tasks: DashMap<Ulid, Shared<Task>>,
    /// Every non-cancelled booking by slot. Its write lock serializes booking creation.
    pub(super) booked_slots: RwLock<SlotBook>,
    /// vehicle id → booking id, while the booking (and its order) is open.
    pub(super) active_vehicles: DashMap<Ulid, Ulid>,
    /// booking id → order id, while the order is open.
    pub(super) open_orders: DashMap<Ulid, Ulid>,
    /// Tasks already sent an almost-due reminder.
    pub(super) reminded: DashSet<Ulid>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer. Must run inside a tokio runtime.
    pub fn new(wal_path: PathBuf, config: ShopConfig, deps: Collaborators) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let folded = fold_records(Wal::replay(&wal_path)?);
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        let storage_failed = Arc::new(AtomicBool::new(false));
        tokio::spawn(wal_writer_loop(wal, wal_rx, storage_failed.clone()));

        let engine = Self {
            calendar: ShopCalendar::new(&config),
            config,
            deps,
            wal_tx,
            storage_failed,
            bays: DashMap::new(),
            bookings: DashMap::new(),
            orders: DashMap::new(),
            tasks: DashMap::new(),
            booked_slots: RwLock::new(SlotBook::default()),
            active_vehicles: DashMap::new(),
            open_orders: DashMap::new(),
            reminded: DashSet::new(),
        };
        engine.restore(folded);
        Ok(engine)
    }

    /// Rebuild in-memory state and derived indexes from replayed records.
    fn restore(&self, folded: Folded) {
        let mut bays: HashMap<Ulid, BayState> = folded
            .bays
            .into_values()
            .map(|b| (b.id, BayState::new(b)))
            .collect();
        for task in folded.tasks.into_values() {
            if task.holds_bay()
                && let Some(bay) = bays.get_mut(&task.bay_id)
            {
                bay.reserve(Reservation {
                    task_id: task.id,
                    span: task.expected,
                });
            }
            self.tasks.insert(task.id, Arc::new(Mutex::new(task)));
        }
        for (id, bay) in bays {
            self.bays.insert(id, Arc::new(RwLock::new(bay)));
        }

        let mut slot_book = SlotBook::default();
        for booking in folded.bookings.into_values() {
            if booking.status != BookingStatus::Cancelled {
                slot_book.insert(booking.id, booking.slot);
            }
            if !booking.status.is_terminal() {
                self.active_vehicles.insert(booking.vehicle_id, booking.id);
            }
            self.bookings
                .insert(booking.id, Arc::new(Mutex::new(booking)));
        }
        // Sole owner during construction: the lock is uncontended.
        if let Ok(mut book) = self.booked_slots.try_write() {
            *book = slot_book;
        }

        for order in folded.orders.into_values() {
            if !order.status.is_terminal() {
                self.open_orders.insert(order.booking_id, order.id);
            }
            self.orders.insert(order.id, Arc::new(Mutex::new(order)));
        }
    }

    pub fn now(&self) -> Ms {
        self.deps.clock.now_ms()
    }

    /// Queue one operation on the WAL writer.
    ///
    /// Once this resolves the entry will be written even if the caller is dropped, so the
    /// caller applies the change in memory before its next `.await` and only then waits on
    /// [`Pending::durable`]. Nothing is queued if this is dropped before resolving.
    pub(super) async fn submit(&self, op: Op, records: Vec<Record>) -> Result<Pending, EngineError> {
        if self.storage_failed.load(Ordering::Acquire) {
            return Err(EngineError::WalError(
                "an earlier WAL flush failed; restart to recover".into(),
            ));
        }
        let permit = self
            .wal_tx
            .reserve()
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        let (tx, rx) = oneshot::channel();
        permit.send(WalCommand::Append {
            event: Event::new(op, self.now(), records),
            response: tx,
        });
        Ok(Pending(rx))
    }

    /// Rewrite the WAL as snapshot entries holding the latest record of every entity.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                at: self.now(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Whether a failed WAL flush has put the engine into read-only mode.
    pub fn storage_failed(&self) -> bool {
        self.storage_failed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn fail_storage(&self) {
        self.storage_failed.store(true, Ordering::Release);
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Hand a notification to the sink. Failures are logged, never returned.
    pub(super) fn notify(&self, notification: Notification) {
        if let Err(e) = self.deps.notifier.notify(&notification) {
            metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL).increment(1);
            warn!(customer = %notification.customer_id(), "{e}");
        }
    }

    // ── Handle lookups (clone the Arc, release the map shard) ──

    pub(super) fn booking_handle(&self, id: Ulid) -> Result<Shared<Booking>, EngineError> {
        self.bookings
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound { entity: "booking", id })
    }

    pub(super) fn order_handle(&self, id: Ulid) -> Result<Shared<ServiceOrder>, EngineError> {
        self.orders
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound { entity: "service order", id })
    }

    pub(super) fn task_handle(&self, id: Ulid) -> Result<Shared<Task>, EngineError> {
        self.tasks
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound { entity: "task", id })
    }

    pub(super) fn bay_handle(&self, id: Ulid) -> Result<SharedBay, EngineError> {
        self.bays
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound { entity: "bay", id })
    }

    /// All bays, sorted by id so lock order is stable.
    pub(super) fn bay_handles(&self) -> Vec<(Ulid, SharedBay)> {
        let mut bays: Vec<(Ulid, SharedBay)> = self
            .bays
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        bays.sort_by_key(|(id, _)| *id);
        bays
    }

    /// Drop the vehicle's active marker if it still points at `booking_id`.
    pub(super) fn release_vehicle(&self, vehicle_id: Ulid, booking_id: Ulid) {
        self.active_vehicles
            .remove_if(&vehicle_id, |_, current| *current == booking_id);
    }
}
