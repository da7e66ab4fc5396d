use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::ShopCalendar;
use crate::model::*;

use super::{Engine, EngineError};

/// Non-cancelled bookings sorted by slot start.
#[derive(Debug, Default, Clone)]
pub struct SlotBook {
    entries: Vec<(Span, Ulid)>,
}

impl SlotBook {
    pub fn insert(&mut self, booking_id: Ulid, slot: Span) {
        let pos = self.entries.partition_point(|(s, _)| s.start <= slot.start);
        self.entries.insert(pos, (slot, booking_id));
    }

    pub fn remove(&mut self, booking_id: Ulid) -> bool {
        match self.entries.iter().position(|(_, id)| *id == booking_id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Bookings whose slot intersects `query`.
    pub fn count_overlapping(&self, query: &Span) -> usize {
        let right_bound = self.entries.partition_point(|(s, _)| s.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(|(s, _)| s.end > query.start)
            .count()
    }
}

impl Engine {
    /// Every slot of a shop-local day with its booking count and availability.
    pub async fn available_time_slots(
        &self,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<Vec<SlotAvailability>, EngineError> {
        let date = ShopCalendar::date(year, month, day).ok_or_else(|| {
            EngineError::InvalidInput(format!("{year:04}-{month:02}-{day:02} is not a date"))
        })?;
        Ok(self.slots_for(date).await)
    }

    pub async fn slots_for(&self, date: NaiveDate) -> Vec<SlotAvailability> {
        let now = self.now();
        let capacity = self.config.max_bookings_per_slot;
        let book = self.booked_slots.read().await;
        self.calendar
            .slots(date)
            .map(|slot| {
                let booked = book.count_overlapping(&slot.span);
                SlotAvailability {
                    hours: slot.hours,
                    minutes: slot.minutes,
                    start: slot.span.start,
                    end: slot.span.end,
                    booked,
                    is_available: booked < capacity && slot.span.start > now,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_book_counts_intersections() {
        let mut book = SlotBook::default();
        let a = Ulid::new();
        book.insert(a, Span::new(100, 200));
        book.insert(Ulid::new(), Span::new(100, 200));
        book.insert(Ulid::new(), Span::new(200, 300));
        book.insert(Ulid::new(), Span::new(0, 100));

        assert_eq!(book.count_overlapping(&Span::new(100, 200)), 2);
        assert_eq!(book.count_overlapping(&Span::new(150, 250)), 3);
        assert_eq!(book.count_overlapping(&Span::new(300, 400)), 0);

        assert!(book.remove(a));
        assert!(!book.remove(a));
        assert_eq!(book.count_overlapping(&Span::new(100, 200)), 1);
        assert_eq!(book.count_overlapping(&Span::new(0, 400)), 3);
    }
}
