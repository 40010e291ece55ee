//! Timestamp utilities
//!
//! All persisted timestamps are RFC 3339 UTC strings with a fixed microsecond
//! precision, so lexical comparison in SQL matches chronological order.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Start of a retention window ending now
pub fn cutoff_days_ago(days: u32) -> DateTime<Utc> {
    now() - Duration::days(i64::from(days))
}
