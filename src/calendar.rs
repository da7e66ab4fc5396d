use chrono::NaiveDate;

use crate::config::ShopConfig;
use crate::model::{DAY_MS, HOUR_MS, MINUTE_MS, Ms, Span};

/// One fixed-width appointment slot, labelled in shop-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySlot {
    pub hours: u32,
    pub minutes: u32,
    pub span: Span,
}

/// Maps shop-local calendar days onto absolute slot spans.
#[derive(Debug, Clone, Copy)]
pub struct ShopCalendar {
    slot_ms: Ms,
    open: Ms,
    close: Ms,
    offset: Ms,
}

impl ShopCalendar {
    pub fn new(config: &ShopConfig) -> Self {
        Self {
            slot_ms: config.slot_ms(),
            open: config.open_hour as Ms * HOUR_MS,
            close: config.close_hour as Ms * HOUR_MS,
            offset: config.utc_offset_minutes as Ms * MINUTE_MS,
        }
    }

    pub fn slot_ms(&self) -> Ms {
        self.slot_ms
    }

    pub fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Local midnight of `date`, as unix ms.
    pub fn day_start(&self, date: NaiveDate) -> Ms {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        midnight.and_utc().timestamp_millis() - self.offset
    }

    /// Absolute instant of a local wall-clock time on `date`.
    pub fn local_instant(&self, date: NaiveDate, hours: u32, minutes: u32) -> Ms {
        self.day_start(date) + hours as Ms * HOUR_MS + minutes as Ms * MINUTE_MS
    }

    /// Every slot between opening and closing time, produced lazily.
    pub fn slots(&self, date: NaiveDate) -> impl Iterator<Item = DaySlot> + use<> {
        let day_start = self.day_start(date);
        let slot_ms = self.slot_ms;
        let open = self.open;
        let close = self.close;
        (0..)
            .map(move |i: Ms| open + i * slot_ms)
            .take_while(move |offset| offset + slot_ms <= close)
            .map(move |offset| DaySlot {
                hours: (offset / HOUR_MS) as u32,
                minutes: ((offset % HOUR_MS) / MINUTE_MS) as u32,
                span: Span::starting_at(day_start + offset, slot_ms),
            })
    }

    fn local_ms_of_day(&self, t: Ms) -> Ms {
        (t + self.offset).rem_euclid(DAY_MS)
    }

    pub fn is_aligned(&self, t: Ms) -> bool {
        self.local_ms_of_day(t) % self.slot_ms == 0
    }

    /// The slot starting at `start`, if that is one the shop offers.
    pub fn slot_starting_at(&self, start: Ms) -> Option<Span> {
        if !self.is_aligned(start) {
            return None;
        }
        let local = self.local_ms_of_day(start);
        if local < self.open || local + self.slot_ms > self.close {
            return None;
        }
        Some(Span::starting_at(start, self.slot_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar(offset_minutes: i32) -> ShopCalendar {
        ShopCalendar::new(&ShopConfig {
            utc_offset_minutes: offset_minutes,
            ..ShopConfig::default()
        })
    }

    #[test]
    fn day_has_fixed_width_slots_between_open_and_close() {
        let cal = calendar(0);
        let date = ShopCalendar::date(2027, 9, 25).unwrap();
        let slots: Vec<DaySlot> = cal.slots(date).collect();
        // 08:00 .. 17:00 in 30 minute steps
        assert_eq!(slots.len(), 18);
        assert_eq!((slots[0].hours, slots[0].minutes), (8, 0));
        assert_eq!((slots[1].hours, slots[1].minutes), (8, 30));
        let last = slots.last().unwrap();
        assert_eq!((last.hours, last.minutes), (16, 30));
        assert_eq!(last.span.end, cal.local_instant(date, 17, 0));
        for pair in slots.windows(2) {
            assert_eq!(pair[0].span.end, pair[1].span.start);
        }
    }

    #[test]
    fn offset_shifts_absolute_times() {
        let utc = calendar(0);
        let plus_two = calendar(120);
        let date = ShopCalendar::date(2027, 9, 25).unwrap();
        assert_eq!(
            utc.local_instant(date, 10, 0) - plus_two.local_instant(date, 10, 0),
            2 * HOUR_MS
        );
        assert!(plus_two.is_aligned(plus_two.local_instant(date, 10, 30)));
    }

    #[test]
    fn slot_lookup_rejects_misaligned_and_closed_hours() {
        let cal = calendar(0);
        let date = ShopCalendar::date(2027, 9, 25).unwrap();
        let ten = cal.local_instant(date, 10, 0);
        assert_eq!(cal.slot_starting_at(ten), Some(Span::new(ten, ten + 30 * MINUTE_MS)));
        assert_eq!(cal.slot_starting_at(ten + 5 * MINUTE_MS), None);
        assert_eq!(cal.slot_starting_at(cal.local_instant(date, 7, 30)), None);
        assert_eq!(cal.slot_starting_at(cal.local_instant(date, 17, 0)), None);
        assert!(cal.slot_starting_at(cal.local_instant(date, 16, 30)).is_some());
    }

    #[test]
    fn invalid_dates_are_none() {
        assert!(ShopCalendar::date(2027, 2, 30).is_none());
        assert!(ShopCalendar::date(2027, 13, 1).is_none());
    }
}
