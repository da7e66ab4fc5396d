use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const SECOND_MS: Ms = 1_000;
pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn starting_at(start: Ms, duration: Ms) -> Self {
        Self::new(start, start + duration)
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Standard half-open intersection. Also true when either span fully contains the other.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Bays ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bay {
    pub id: Ulid,
    pub name: String,
}

/// A bay's time held by one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub task_id: Ulid,
    pub span: Span,
}

/// In-memory schedule of one bay: every reservation, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct BayState {
    pub bay: Bay,
    pub reservations: Vec<Reservation>,
}

impl BayState {
    pub fn new(bay: Bay) -> Self {
        Self {
            bay,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn reserve(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn release(&mut self, task_id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.task_id == task_id)?;
        Some(self.reservations.remove(pos))
    }

    /// Reservations whose span intersects `query`.
    /// Everything at index >= right_bound starts at or after `query.end` and can't overlap.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    /// Milliseconds of `window` already reserved on this bay.
    pub fn reserved_within(&self, window: &Span) -> Ms {
        self.overlapping(window)
            .map(|r| r.span.end.min(window.end) - r.span.start.max(window.start))
            .sum()
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Booked,
    InProgress,
    CheckedIn,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub vehicle_id: Ulid,
    pub service_ids: Vec<Ulid>,
    pub slot: Span,
    pub status: BookingStatus,
    pub created_at: Ms,
}

// ── Service orders ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    WaitingInspection,
    InspectionCompleted,
    WaitingCustomerApproval,
    Approved,
    Scheduled,
    Servicing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// The order lifecycle graph. Nothing outside these edges is a legal move.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Created, WaitingInspection)
            | (WaitingInspection, InspectionCompleted)
            | (InspectionCompleted, WaitingCustomerApproval)
            | (WaitingCustomerApproval, Approved)
            | (InspectionCompleted, Scheduled)
            | (Approved, Scheduled)
            | (Scheduled, Servicing)
            | (Servicing, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Service { service_id: Ulid },
    Part { part_id: Ulid },
    Custom,
}

/// A priced line on an order. Prices are minor currency units, captured when the line is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub kind: LineItemKind,
    pub description: String,
    pub quantity: u32,
    pub unit_price: u64,
}

impl LineItem {
    pub fn total(&self) -> u64 {
        self.unit_price.saturating_mul(self.quantity as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub customer_id: Ulid,
    pub vehicle_id: Ulid,
    pub staff_id: Ulid,
    pub line_items: Vec<LineItem>,
    pub status: OrderStatus,
    pub created_at: Ms,
    pub completed_at: Option<Ms>,
    pub task_ids: Vec<Ulid>,
}

impl ServiceOrder {
    pub fn total(&self) -> u64 {
        self.line_items
            .iter()
            .map(LineItem::total)
            .fold(0, u64::saturating_add)
    }
}

// ── Tasks ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Inspection,
    Servicing,
}

impl TaskType {
    pub fn label(self) -> &'static str {
        match self {
            TaskType::Inspection => "inspection",
            TaskType::Servicing => "servicing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Scheduled or in progress: counts against the one-active-task-per-type rule.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Scheduled | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicianRole {
    Lead,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianAssignment {
    pub technician_id: Ulid,
    pub role: TechnicianRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub title: String,
    pub comment: Option<String>,
    pub media: Vec<Ulid>,
    pub at: Ms,
}

/// Variant-specific task data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDetail {
    Inspection {
        comment: Option<String>,
        media: Vec<Ulid>,
    },
    Servicing {
        timeline: Vec<TimelineEntry>,
    },
}

impl TaskDetail {
    pub fn empty(task_type: TaskType) -> Self {
        match task_type {
            TaskType::Inspection => TaskDetail::Inspection {
                comment: None,
                media: Vec::new(),
            },
            TaskType::Servicing => TaskDetail::Servicing {
                timeline: Vec::new(),
            },
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskDetail::Inspection { .. } => TaskType::Inspection,
            TaskDetail::Servicing { .. } => TaskType::Servicing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Ulid,
    pub service_order_id: Ulid,
    pub bay_id: Ulid,
    /// Expected window `[start, end)` reserved on `bay_id`.
    pub expected: Span,
    pub actual_start: Option<Ms>,
    pub actual_end: Option<Ms>,
    pub status: TaskStatus,
    pub technicians: Vec<TechnicianAssignment>,
    pub detail: TaskDetail,
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        self.detail.task_type()
    }

    /// Whether this task holds time on its bay.
    pub fn holds_bay(&self) -> bool {
        self.status != TaskStatus::Cancelled
    }
}

// ── WAL records ──────────────────────────────────────────────────

/// Full snapshot of one stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Bay(Bay),
    Booking(Booking),
    Order(ServiceOrder),
    Task(Task),
}

/// The operation that produced a WAL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    BayAdded,
    BookingCreated,
    BookingCancelled,
    CheckedIn,
    TaskScheduled,
    TaskStarted,
    TaskCompleted,
    TimelineAppended,
    TaskRelocated,
    LineItemAdded,
    OrderStatusChanged,
    OrderCancelled,
    Snapshot,
}

/// One WAL entry. Every write commits exactly one of these, carrying every record it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub op: Op,
    pub at: Ms,
    pub records: Vec<Record>,
}

impl Event {
    pub fn new(op: Op, at: Ms, records: Vec<Record>) -> Self {
        Self { op, at, records }
    }
}

// ── Query result types ───────────────────────────────────────────

/// One bookable slot of a day, tagged with availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
    pub hours: u32,
    pub minutes: u32,
    pub start: Ms,
    pub end: Ms,
    pub booked: usize,
    pub is_available: bool,
}

/// A bay and the task windows it holds, in start order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaySchedule {
    pub bay: Bay,
    pub reservations: Vec<Reservation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(start: Ms, end: Ms) -> Reservation {
        Reservation {
            task_id: Ulid::new(),
            span: Span::new(start, end),
        }
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(100, 200);
        assert!(a.overlaps(&Span::new(150, 250)));
        assert!(!a.overlaps(&Span::new(200, 300))); // adjacent, not overlapping
        assert!(a.overlaps(&Span::new(0, 1000))); // containment
        assert!(Span::new(120, 130).overlaps(&a));
        assert!(a.contains_instant(100));
        assert!(!a.contains_instant(200));
    }

    #[test]
    fn bay_reservations_stay_sorted() {
        let mut bay = BayState::new(Bay {
            id: Ulid::new(),
            name: "bay-1".into(),
        });
        bay.reserve(reservation(500, 600));
        bay.reserve(reservation(100, 200));
        bay.reserve(reservation(300, 400));
        let starts: Vec<Ms> = bay.reservations.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![100, 300, 500]);

        let hits: Vec<Ms> = bay
            .overlapping(&Span::new(150, 350))
            .map(|r| r.span.start)
            .collect();
        assert_eq!(hits, vec![100, 300]);
        assert_eq!(bay.reserved_within(&Span::new(150, 350)), 50 + 50);
    }

    #[test]
    fn bay_release_removes_only_that_task() {
        let mut bay = BayState::new(Bay {
            id: Ulid::new(),
            name: "bay-2".into(),
        });
        let a = reservation(0, 10);
        let b = reservation(20, 30);
        bay.reserve(a);
        bay.reserve(b);
        assert_eq!(bay.release(a.task_id), Some(a));
        assert_eq!(bay.release(a.task_id), None);
        assert_eq!(bay.reservations, vec![b]);
    }

    #[test]
    fn order_graph_edges() {
        use OrderStatus::*;
        let all = [
            Created,
            WaitingInspection,
            InspectionCompleted,
            WaitingCustomerApproval,
            Approved,
            Scheduled,
            Servicing,
            Completed,
            Cancelled,
        ];
        let legal = [
            (Created, WaitingInspection),
            (WaitingInspection, InspectionCompleted),
            (InspectionCompleted, WaitingCustomerApproval),
            (WaitingCustomerApproval, Approved),
            (InspectionCompleted, Scheduled),
            (Approved, Scheduled),
            (Scheduled, Servicing),
            (Servicing, Completed),
        ];
        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to)) || (to == Cancelled && !from.is_terminal());
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn order_total_sums_lines() {
        let line = |qty, price| LineItem {
            kind: LineItemKind::Custom,
            description: "x".into(),
            quantity: qty,
            unit_price: price,
        };
        let order = ServiceOrder {
            id: Ulid::new(),
            booking_id: Ulid::new(),
            customer_id: Ulid::new(),
            vehicle_id: Ulid::new(),
            staff_id: Ulid::new(),
            line_items: vec![line(2, 1500), line(1, 999)],
            status: OrderStatus::Created,
            created_at: 0,
            completed_at: None,
            task_ids: Vec::new(),
        };
        assert_eq!(order.total(), 3999);
    }

    #[test]
    fn order_total_saturates() {
        let line = |unit_price: u64, quantity: u32| LineItem {
            kind: LineItemKind::Custom,
            description: "Engine rebuild".into(),
            quantity,
            unit_price,
        };
        let mut order = ServiceOrder {
            id: Ulid::new(),
            booking_id: Ulid::new(),
            customer_id: Ulid::new(),
            vehicle_id: Ulid::new(),
            staff_id: Ulid::new(),
            line_items: vec![line(1_000, 3), line(250, 2)],
            status: OrderStatus::Created,
            created_at: 0,
            completed_at: None,
            task_ids: Vec::new(),
        };
        assert_eq!(order.total(), 3_500);

        order.line_items.push(line(u64::MAX / 2, 1));
        order.line_items.push(line(u64::MAX / 2, 1));
        assert_eq!(order.total(), u64::MAX);
    }
}
