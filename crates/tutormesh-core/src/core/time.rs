// tutormesh-core/src/core/time.rs
// ============================================================================
// Module: Tutormesh Time Model
// Description: Unix-millisecond timestamps and mastery event dates.
// Purpose: Provide explicit time values for records, skew checks, and keys.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Timestamps are explicit unix-millisecond values embedded in requests,
//! events, and stored records. Event dates are UTC calendar days used in
//! composite store keys and history aggregation. Wall-clock reads happen at
//! ingress boundaries; stored records never re-read the clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use time::Date;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Calendar-date format used in store keys and history responses.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

// ============================================================================
// SECTION: Unix Millis
// ============================================================================

/// Canonical unix-millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixMillis(i64);

impl UnixMillis {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        Self(millis)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns the absolute difference between two timestamps in milliseconds.
    #[must_use]
    pub const fn abs_diff(self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Returns the UTC calendar date containing this timestamp.
    #[must_use]
    pub fn date(self) -> EventDate {
        EventDate::from_unix_millis(self)
    }
}

impl fmt::Display for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Event Date
// ============================================================================

/// UTC calendar day used in mastery keys and history buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventDate(Date);

/// Error returned when a calendar date fails to parse.
#[derive(Debug, thiserror::Error)]
#[error("invalid date (expected YYYY-MM-DD): {0}")]
pub struct DateParseError(String);

impl EventDate {
    /// Returns the date containing the provided timestamp, in UTC.
    #[must_use]
    pub fn from_unix_millis(at: UnixMillis) -> Self {
        OffsetDateTime::from_unix_timestamp(at.get().div_euclid(1_000))
            .map_or(Self(OffsetDateTime::UNIX_EPOCH.date()), |moment| Self(moment.date()))
    }

    /// Parses a `YYYY-MM-DD` date string.
    ///
    /// # Errors
    ///
    /// Returns [`DateParseError`] when the value is not a valid calendar date.
    pub fn parse(value: &str) -> Result<Self, DateParseError> {
        Date::parse(value, DATE_FORMAT)
            .map(Self)
            .map_err(|_| DateParseError(value.to_string()))
    }

    /// Returns the signed day offset from `base` to this date.
    #[must_use]
    pub fn days_since(self, base: Self) -> i64 {
        i64::from(self.0.to_julian_day()) - i64::from(base.0.to_julian_day())
    }

    /// Returns the next calendar day when representable.
    #[must_use]
    pub fn next_day(self) -> Option<Self> {
        self.0.next_day().map(Self)
    }

    /// Returns the date `days` earlier, saturating at the representable
    /// range.
    #[must_use]
    pub fn minus_days(self, days: i64) -> Self {
        let shifted = i64::from(self.0.to_julian_day()) - days;
        i32::try_from(shifted)
            .ok()
            .and_then(|julian| Date::from_julian_day(julian).ok())
            .map_or(self, Self)
    }

    /// Returns the ISO week bucket label (`YYYY-Www`) for history grouping.
    #[must_use]
    pub fn week_bucket(self) -> String {
        let (year, week, _) = self.0.to_iso_week_date();
        format!("{year:04}-W{week:02}")
    }

    /// Returns the month bucket label (`YYYY-MM`) for history grouping.
    #[must_use]
    pub fn month_bucket(self) -> String {
        format!("{:04}-{:02}", self.0.year(), u8::from(self.0.month()))
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.0.format(DATE_FORMAT).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl FromStr for EventDate {
    type Err = DateParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for EventDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EventDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
