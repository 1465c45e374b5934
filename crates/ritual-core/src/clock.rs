//! Time source and calendar-day policy.
//!
//! Completions are keyed by calendar day, not by instant. The day boundary
//! is a fixed UTC offset taken from configuration so the same instant maps
//! to the same day on every host, regardless of the machine's local zone.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Supplies the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Maps instants onto calendar days in a fixed reference offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Parse an offset of the form `+HH:MM`, `-HH:MM` or `Z`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
            return Some(Self::utc());
        }

        let (sign, rest) = match value.as_bytes().first()? {
            b'+' => (1, &value[1..]),
            b'-' => (-1, &value[1..]),
            _ => return None,
        };
        let (hours, minutes) = rest.split_once(':')?;
        let hours = two_digits(hours)?;
        let minutes = two_digits(minutes)?;
        if hours > 23 || minutes > 59 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar day that `instant` falls on in this offset.
    pub fn calendar_day(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}

/// Exactly two ASCII digits.
fn two_digits(field: &str) -> Option<i32> {
    match field.as_bytes() {
        [tens @ b'0'..=b'9', ones @ b'0'..=b'9'] => {
            Some(i32::from(*tens - b'0') * 10 + i32::from(*ones - b'0'))
        }
        _ => None,
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}
