//! In-memory storage backend (no persistence)
//!
//! Selected with `"backend": "none"`. Records are kept in a ring buffer and
//! notification times in a map, both lost on restart. Every operation
//! completes immediately.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    time::Duration,
};

use chrono::NaiveDateTime;
use tracing::debug;

use super::{MonitoringStorage, StorageRequest, schema::MonitoringRecord, schema::should_notify};
use crate::util;

/// Maximum records to keep in memory
const MAX_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Default)]
pub struct MemoryMonitoringStorage {
    records: RefCell<VecDeque<MonitoringRecord>>,
    notifications: RefCell<HashMap<String, NaiveDateTime>>,
}

impl MemoryMonitoringStorage {
    pub fn new() -> MemoryMonitoringStorage {
        Self::default()
    }

    /// Stored records, oldest first.
    pub fn records(&self) -> Vec<MonitoringRecord> {
        self.records.borrow().iter().cloned().collect()
    }

    pub fn last_notified(&self, user_key: &str) -> Option<NaiveDateTime> {
        self.notifications.borrow().get(user_key).copied()
    }

    pub fn set_last_notified(&self, user_key: &str, notified_at: NaiveDateTime) {
        self.notifications
            .borrow_mut()
            .insert(user_key.to_string(), notified_at);
    }
}

impl MonitoringStorage for MemoryMonitoringStorage {
    fn store_record(&self, record: &MonitoringRecord) -> StorageRequest<()> {
        let mut records = self.records.borrow_mut();
        if records.len() == MAX_BUFFER_SIZE {
            records.pop_front();
        }
        records.push_back(record.clone());
        debug!("in-memory storage holds {} records", records.len());

        StorageRequest::ready(Ok(()))
    }

    fn check_notification_interval(&self, user_key: &str, period: Duration) -> StorageRequest<bool> {
        let notify = should_notify(self.last_notified(user_key), util::now(), period);
        StorageRequest::ready(Ok(notify))
    }

    fn store_notification_time(&self, user_key: &str) -> StorageRequest<()> {
        self.set_last_notified(user_key, util::now());
        StorageRequest::ready(Ok(()))
    }
}
