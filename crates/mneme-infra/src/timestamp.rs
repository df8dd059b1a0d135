//! Fixed-width RFC 3339 timestamps.
//!
//! Nanosecond precision with a `Z` suffix keeps the text form lexicographically
//! ordered, so `ORDER BY created_at` on a TEXT column sorts chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

pub(crate) fn format(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
