use crate::model::{HOUR_MS, Ms};

pub const MAX_BAYS: usize = 256;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SERVICES_PER_BOOKING: usize = 32;
pub const MAX_TECHNICIANS_PER_TASK: usize = 8;
pub const MAX_TEXT_LEN: usize = 4_096;
pub const MAX_TIMELINE_ENTRIES: usize = 512;
pub const MAX_MEDIA_PER_ENTRY: usize = 16;
pub const MAX_LINE_ITEMS: usize = 256;
pub const MAX_LINE_QUANTITY: u32 = 10_000;
/// In minor currency units.
pub const MAX_UNIT_PRICE: u64 = 100_000_000_000;

/// Longest task the scheduler accepts.
pub const MAX_TASK_DURATION_MS: Ms = 24 * HOUR_MS;
