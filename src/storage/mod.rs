//! Persistence of samples and notification throttling
//!
//! The collector needs exactly three operations from its store, captured by
//! the [`MonitoringStorage`] trait:
//!
//! - **store_record**: append one sample to the history
//! - **check_notification_interval**: decide whether a client may be mailed
//!   again
//! - **store_notification_time**: remember that a client was just mailed
//!
//! Every operation returns a [`StorageRequest`]. Awaiting it yields the result;
//! dropping it abandons interest while the underlying statement may still run
//! to completion.
//!
//! ## Backends
//!
//! - **SQLite** (default): [`DatabaseMonitoringStorage`] over the
//!   [`crate::database`] multiplexer
//! - **In-Memory**: [`MemoryMonitoringStorage`], no persistence
//!
//! ## Usage
//!
//! ```no_run
//! use metrics_collector::storage::SqliteMonitoringStorage;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = SqliteMonitoringStorage::open("./collector.db").await?;
//!     // hand to the server, which drives storage.update()
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod memory;
pub mod schema;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

pub use database::DatabaseMonitoringStorage;
#[cfg(feature = "storage-sqlite")]
pub use database::SqliteMonitoringStorage;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryMonitoringStorage;
pub use schema::MonitoringRecord;

/// Store used by the collector's connections.
///
/// Implementations are single-threaded; the server owns them behind an `Rc`.
pub trait MonitoringStorage {
    fn store_record(&self, record: &MonitoringRecord) -> StorageRequest<()>;

    /// Resolves to `true` if `user_key` was never notified or its last
    /// notification is at least `period` ago.
    fn check_notification_interval(&self, user_key: &str, period: Duration) -> StorageRequest<bool>;

    /// Record the current time as the last notification of `user_key`.
    fn store_notification_time(&self, user_key: &str) -> StorageRequest<()>;

    /// Make progress on outstanding work. Called on every reactor tick.
    fn update(&self) {}
}

/// Pending storage operation. Dropping it abandons the operation.
#[must_use = "dropping a storage request abandons it"]
pub struct StorageRequest<T> {
    inner: Pin<Box<dyn Future<Output = StorageResult<T>>>>,
}

impl<T: 'static> StorageRequest<T> {
    pub fn new(future: impl Future<Output = StorageResult<T>> + 'static) -> StorageRequest<T> {
        Self {
            inner: Box::pin(future),
        }
    }

    /// A request that has already completed.
    pub fn ready(result: StorageResult<T>) -> StorageRequest<T> {
        Self::new(std::future::ready(result))
    }
}

impl<T> Future for StorageRequest<T> {
    type Output = StorageResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}
