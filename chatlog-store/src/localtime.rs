//! Local-calendar-day bucketing.
//!
//! Day buckets are computed from the local UTC offset *at the record's
//! instant*, not the offset of "now". Two replicas in different timezones
//! will therefore disagree on day boundaries for otherwise-identical logs —
//! a known, intentional consequence of the on-disk format, preserved rather
//! than "fixed".

use chrono::{Local, NaiveDate, TimeZone};

/// Source of the UTC offset used to bucket a `time` value into a local day.
///
/// Exists so tests can pin a fixed offset instead of depending on the
/// process's actual local timezone, exposing it as an injectable dependency
/// for deterministic results.
pub trait TimeSource {
    /// UTC offset, in seconds, in effect at `epoch_seconds`.
    fn utc_offset_seconds(&self, epoch_seconds: u32) -> i64;
}

/// The process's actual local timezone, resolved per-instant via `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLocalTime;

impl TimeSource for SystemLocalTime {
    fn utc_offset_seconds(&self, epoch_seconds: u32) -> i64 {
        match Local.timestamp_opt(i64::from(epoch_seconds), 0) {
            chrono::LocalResult::Single(dt) => i64::from(dt.offset().local_minus_utc()),
            chrono::LocalResult::Ambiguous(dt, _) => i64::from(dt.offset().local_minus_utc()),
            chrono::LocalResult::None => 0,
        }
    }
}

/// A fixed offset, for tests that need byte-exact determinism across
/// machines regardless of their configured timezone.
#[derive(Debug, Clone, Copy)]
pub struct FixedOffset(pub i64);

impl TimeSource for FixedOffset {
    fn utc_offset_seconds(&self, _epoch_seconds: u32) -> i64 {
        self.0
    }
}

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Computes the local-calendar day number for `epoch_seconds`:
/// `floor((time * 1000) / DAY_MS - utc_offset_seconds / 86_400)`.
pub fn local_day(time_source: &dyn TimeSource, epoch_seconds: u32) -> u16 {
    let offset = time_source.utc_offset_seconds(epoch_seconds);
    let millis = i64::from(epoch_seconds) * 1000;
    let day = (millis as f64 / DAY_MS as f64 - offset as f64 / 86_400.0).floor();
    day as i64 as u16
}

/// Converts a calendar date into the day-number encoding used by the index,
/// for CLI callers that want to filter a backlog by `YYYY-MM-DD` rather than
/// a raw day number.
pub fn day_number_from_date(date: NaiveDate) -> u16 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date");
    date.signed_duration_since(epoch).num_days() as u16
}

/// Inverse of [`day_number_from_date`], for rendering [`crate::query::distinct_dates`]
/// output back to a calendar date.
pub fn date_from_day_number(day: u16) -> NaiveDate {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date");
    epoch + chrono::Duration::days(i64::from(day))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_day_zero_is_epoch() {
        assert_eq!(local_day(&FixedOffset(0), 0), 0);
        assert_eq!(local_day(&FixedOffset(0), 86_399), 0);
        assert_eq!(local_day(&FixedOffset(0), 86_400), 1);
    }

    #[test]
    fn offset_shifts_the_day_boundary() {
        // Exact UTC midnight on day 20000.
        let midnight_utc = 20_000 * 86_400;
        assert_eq!(local_day(&FixedOffset(0), midnight_utc), 20_000);
        // A positive (east-of-UTC) offset subtracts a fraction of a day,
        // landing one day earlier right at the UTC boundary.
        assert_eq!(local_day(&FixedOffset(5 * 3600), midnight_utc), 19_999);
        // A negative offset adds a fraction of a day and stays put.
        assert_eq!(local_day(&FixedOffset(-5 * 3600), midnight_utc), 20_000);
    }
}
