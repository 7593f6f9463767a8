//! Timestamp (de)serialization.
//!
//! Timestamps are stored as fixed-width RFC3339 strings with nanosecond
//! precision in UTC (`2026-01-02T03:04:05.000000006Z`), so plain `TEXT`
//! comparison in SQL orders them chronologically.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcDateTime};

const STORED: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z");

pub fn now() -> UtcDateTime {
    UtcDateTime::now()
}

/// Format for storage (and for the wire, which accepts any RFC3339).
pub fn format(at: UtcDateTime) -> String {
    // Formatting only fails for years outside 0..=9999.
    at.format(STORED).unwrap_or_else(|_| String::from("1970-01-01T00:00:00.000000000Z"))
}

/// Parse any RFC3339 timestamp (stored or from the server).
pub fn parse(value: &str) -> Result<UtcDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map(OffsetDateTime::to_utc)
        .or_raise(|| ErrorKind::InvalidData("timestamp"))
}

pub(crate) fn parse_opt(value: Option<&str>) -> Result<Option<UtcDateTime>> {
    value.map(parse).transpose()
}
