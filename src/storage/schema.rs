//! Stored data types and the SQL that reads and writes them
//!
//! Tables (see `migrations/`):
//!
//! ```text
//! statistics(user_key, time_stamp, cpu_usage, memory_usage, process_count)
//! notifications(user_key UNIQUE, last_notified)
//! ```
//!
//! Timestamps are stored as ISO-8601 basic text, absent metrics as NULL.

use std::fmt::Display;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};

use super::error::{StorageError, StorageResult};
use crate::database::QueryResults;
use crate::util::{format_timestamp, parse_timestamp};

/// One sample pushed by an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringRecord {
    pub user_key: String,
    pub timestamp: NaiveDateTime,
    /// Percent, 0 to 100
    pub cpu_usage: Option<u8>,
    /// Percent, 0 to 100
    pub memory_usage: Option<u8>,
    pub process_count: Option<u32>,
}

pub fn insert_record_sql(record: &MonitoringRecord) -> String {
    format!(
        "INSERT INTO statistics (user_key, time_stamp, cpu_usage, memory_usage, process_count) \
         VALUES ({}, {}, {}, {}, {});",
        quote(&record.user_key),
        quote(&format_timestamp(record.timestamp)),
        nullable(record.cpu_usage),
        nullable(record.memory_usage),
        nullable(record.process_count),
    )
}

pub fn select_last_notified_sql(user_key: &str) -> String {
    format!(
        "SELECT last_notified FROM notifications WHERE user_key = {};",
        quote(user_key)
    )
}

pub fn upsert_notification_sql(user_key: &str, notified_at: NaiveDateTime) -> String {
    format!(
        "INSERT INTO notifications (user_key, last_notified) VALUES ({}, {}) \
         ON CONFLICT(user_key) DO UPDATE SET last_notified = EXCLUDED.last_notified;",
        quote(user_key),
        quote(&format_timestamp(notified_at)),
    )
}

/// Extract `last_notified` from the result of [`select_last_notified_sql`].
pub fn last_notified(results: &QueryResults) -> StorageResult<Option<NaiveDateTime>> {
    if results.row_count(0) == 0 {
        return Ok(None);
    }

    let value = results
        .value(0, 0, 0)
        .ok_or_else(|| StorageError::InvalidData("last_notified is NULL".to_string()))?;
    parse_timestamp(value)
        .map(Some)
        .ok_or_else(|| StorageError::InvalidData(format!("bad last_notified \"{value}\"")))
}

/// Throttle decision: stay quiet while `now` lies in
/// `[last_notified, last_notified + period)`.
pub fn should_notify(
    last_notified: Option<NaiveDateTime>,
    now: NaiveDateTime,
    period: Duration,
) -> bool {
    let Some(last_notified) = last_notified else {
        return true;
    };

    let period = TimeDelta::from_std(period).unwrap_or(TimeDelta::MAX);
    let window_end = last_notified
        .checked_add_signed(period)
        .unwrap_or(NaiveDateTime::MAX);

    !(now >= last_notified && now < window_end)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn nullable<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "NULL".to_string(), |value| value.to_string())
}
