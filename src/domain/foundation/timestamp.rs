//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, Months, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Midnight UTC on the given calendar date, or `None` for an invalid date.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Self(dt.and_utc()))
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Whole days from `from` until `self`, rounded up. Zero or negative when `self` is not later.
    pub fn days_until_ceil(&self, from: &Timestamp) -> i64 {
        let secs = self.duration_since(from).num_seconds();
        let day = 86_400;
        if secs > 0 {
            (secs + day - 1) / day
        } else {
            secs / day
        }
    }

    /// Creates a new timestamp by adding the specified number of days.
    ///
    /// Negative values subtract days. Saturates at the representable range.
    pub fn add_days(&self, days: i64) -> Self {
        Duration::try_days(days)
            .and_then(|d| self.0.checked_add_signed(d))
            .map(Self)
            .unwrap_or(if days >= 0 { Self::max() } else { Self::min() })
    }

    /// Creates a new timestamp by adding calendar months.
    ///
    /// Day-of-month is clamped to the last day of the target month
    /// (Jan 31 + 1 month = Feb 28/29).
    pub fn add_months(&self, months: u32) -> Self {
        self.0
            .checked_add_months(Months::new(months))
            .map(Self)
            .unwrap_or_else(Self::max)
    }

    /// Creates a timestamp from Unix seconds.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Self)
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> i64 {
        self.0.timestamp()
    }

    fn max() -> Self {
        Self(DateTime::<Utc>::MAX_UTC)
    }

    fn min() -> Self {
        Self(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}
