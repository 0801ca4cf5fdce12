//! Database module

pub mod connection;
pub mod repositories;
pub mod schema;
pub mod store;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde_json::Value;

pub use connection::Database;
pub use repositories::config::ConfigRepository;
pub use repositories::message::MessageRepository;
pub use repositories::session::SessionRepository;
pub use store::{SqliteStore, SyncStore};

/// Fixed-width RFC 3339 so that stored timestamps compare correctly as text.
/// Only valid for years 0000 through 9999.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

fn conversion_failure(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Read a stored timestamp column, failing on text that is not RFC 3339
pub(crate) fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn optional_timestamp_column(
    row: &Row,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp_column(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Read a JSON text column, failing on invalid JSON
pub(crate) fn json_column(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn optional_json_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Value>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => json_column(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Read an enum stored by its `as_str` name
pub(crate) fn enum_column<T>(
    row: &Row,
    idx: usize,
    parse: impl FnOnce(&str) -> anyhow::Result<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| conversion_failure(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
        assert_eq!(format_timestamp(&early), "2024-01-01T09:00:00.000Z");
    }

    #[test]
    fn timestamps_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 1).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)), Ok(ts));
        assert!(parse_timestamp("yesterday").is_err());
    }
}
