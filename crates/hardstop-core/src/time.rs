//! UTC timestamp handling.
//!
//! Storage and artifacts carry ISO 8601 strings with a `Z` suffix so that
//! lexicographic order matches chronological order. Parsing is forgiving
//! (feeds disagree about formats); formatting is strict.
//!
//! The core never reads the wall clock; `now` is always an input.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A UTC timestamp that serializes as an ISO 8601 `Z`-suffixed string.
/// (A newtype struct serializes as its inner value, so the JSON shape is
/// the bare string.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtcTimestamp(#[serde(with = "z_format")] DateTime<Utc>);

mod z_format {
    use super::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_flexible(&raw)
            .map(super::UtcTimestamp::into_inner)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid UTC timestamp: {raw}")))
    }
}

impl UtcTimestamp {
    /// Wraps a chrono UTC datetime.
    #[must_use]
    pub const fn new(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Builds a timestamp from calendar components. Returns `None` for
    /// out-of-range values.
    #[must_use]
    pub fn from_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }

    /// Returns the inner chrono datetime.
    #[must_use]
    pub const fn into_inner(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the calendar date portion.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// The `YYYYMMDD` compact form used in minted ids.
    #[must_use]
    pub fn compact_date(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// Adds a (possibly negative) duration.
    #[must_use]
    pub fn plus(&self, d: Duration) -> Self {
        Self(self.0 + d)
    }

    /// Signed whole hours from `other` to `self`.
    #[must_use]
    pub fn hours_since(&self, other: &Self) -> i64 {
        (self.0 - other.0).num_hours()
    }

    /// Signed duration from `other` to `self`.
    #[must_use]
    pub fn since(&self, other: &Self) -> Duration {
        self.0 - other.0
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl FromStr for UtcTimestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_flexible(s).ok_or_else(|| Error::Serialization {
            message: format!("invalid UTC timestamp: {s}"),
        })
    }
}

impl From<DateTime<Utc>> for UtcTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Parses a timestamp in any of the formats feeds actually emit.
///
/// Accepted: RFC 3339 with offset or `Z`, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` (assumed UTC when no offset is present). Offsets
/// are converted to UTC. Returns `None` when nothing parses; the caller
/// decides whether that is a warning or an error.
#[must_use]
pub fn parse_flexible(raw: &str) -> Option<UtcTimestamp> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(UtcTimestamp(dt.with_timezone(&Utc)));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(UtcTimestamp(Utc.from_utc_datetime(&naive)));
        }
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Some(UtcTimestamp(dt.with_timezone(&Utc)));
        }
    }

    None
}

/// Parses an ETA or other date-only-or-datetime value.
///
/// Date-only values (`YYYY-MM-DD`) are interpreted as end-of-day UTC
/// (23:59:59) so that "due today" stays due through the whole day.
/// Timezone-bearing values are converted to UTC. Returns `None` on anything
/// unparseable, never an error.
#[must_use]
pub fn parse_eta_date(raw: &str) -> Option<UtcTimestamp> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.len() == 10 {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            let eod = date.and_hms_opt(23, 59, 59)?;
            return Some(UtcTimestamp(Utc.from_utc_datetime(&eod)));
        }
    }

    parse_flexible(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> UtcTimestamp {
        s.parse().unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
    }

    #[test]
    fn formats_with_z_suffix() {
        let t = UtcTimestamp::from_ymd_hms(2025, 12, 29, 17, 0, 0).unwrap();
        assert_eq!(t.to_string(), "2025-12-29T17:00:00Z");
    }

    #[test]
    fn lexicographic_order_matches_chronological() {
        let earlier = ts("2025-12-29T17:00:00Z");
        let later = ts("2025-12-29T23:00:00Z");
        assert!(earlier < later);
        assert!(earlier.to_string() < later.to_string());
    }

    #[test]
    fn parses_offset_and_converts_to_utc() {
        let t = parse_flexible("2025-12-29T12:00:00-05:00").unwrap();
        assert_eq!(t.to_string(), "2025-12-29T17:00:00Z");
    }

    #[test]
    fn parses_space_separated_naive_as_utc() {
        let t = parse_flexible("2025-12-29 17:00:00").unwrap();
        assert_eq!(t.to_string(), "2025-12-29T17:00:00Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_flexible("not a date").is_none());
        assert!(parse_flexible("").is_none());
    }

    #[test]
    fn eta_date_only_is_end_of_day() {
        let t = parse_eta_date("2025-12-30").unwrap();
        assert_eq!(t.to_string(), "2025-12-30T23:59:59Z");
    }

    #[test]
    fn eta_datetime_passes_through() {
        let t = parse_eta_date("2025-12-30T08:00:00Z").unwrap();
        assert_eq!(t.to_string(), "2025-12-30T08:00:00Z");
    }

    #[test]
    fn eta_garbage_is_none() {
        assert!(parse_eta_date("soon").is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let t = ts("2025-12-29T17:00:00Z");
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#""2025-12-29T17:00:00Z""#);
        let back: UtcTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn compact_date_for_ids() {
        assert_eq!(ts("2025-12-29T17:00:00Z").compact_date(), "20251229");
    }
}
