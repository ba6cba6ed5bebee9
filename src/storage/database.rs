//! Storage on top of the database multiplexer

use std::time::Duration;

use tracing::{debug, instrument, trace};

use super::{
    MonitoringStorage, StorageRequest,
    schema::{self, MonitoringRecord},
};
use crate::database::{Database, Driver};
use crate::util;

#[cfg(feature = "storage-sqlite")]
use {
    super::StorageResult,
    crate::database::sqlite::SqliteDriver,
    sqlx::{Connection, SqliteConnection},
    std::path::Path,
};

/// SQL-backed [`MonitoringStorage`].
///
/// Every operation becomes one templated script submitted to the pool; the
/// pool only makes progress while [`MonitoringStorage::update`] is called.
pub struct DatabaseMonitoringStorage<D: Driver> {
    database: Database<D>,
}

#[cfg(feature = "storage-sqlite")]
pub type SqliteMonitoringStorage = DatabaseMonitoringStorage<SqliteDriver>;

impl<D: Driver> DatabaseMonitoringStorage<D> {
    pub fn new(database: Database<D>) -> DatabaseMonitoringStorage<D> {
        Self { database }
    }

    pub fn database(&self) -> &Database<D> {
        &self.database
    }
}

#[cfg(feature = "storage-sqlite")]
impl DatabaseMonitoringStorage<SqliteDriver> {
    /// Open (or create) the SQLite database at `path` and bring its schema up
    /// to date.
    #[instrument(skip_all)]
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let driver = SqliteDriver::open(path.as_ref());
        debug!("opening sqlite storage at {}", path.as_ref().display());

        let mut connection = SqliteConnection::connect_with(driver.options()).await?;
        sqlx::migrate!("./migrations").run(&mut connection).await?;
        connection.close().await?;

        Ok(Self::new(Database::new(driver)))
    }
}

impl<D: Driver> MonitoringStorage for DatabaseMonitoringStorage<D> {
    fn store_record(&self, record: &MonitoringRecord) -> StorageRequest<()> {
        trace!("storing record for {}", record.user_key);
        let request = self.database.submit(schema::insert_record_sql(record));

        StorageRequest::new(async move {
            request.await?;
            Ok(())
        })
    }

    fn check_notification_interval(&self, user_key: &str, period: Duration) -> StorageRequest<bool> {
        let request = self.database.submit(schema::select_last_notified_sql(user_key));
        let user_key = user_key.to_string();

        StorageRequest::new(async move {
            let results = request.await?;
            let last_notified = schema::last_notified(&results)?;
            let notify = schema::should_notify(last_notified, util::now(), period);
            debug!("{user_key}: last notified {last_notified:?}, notify again: {notify}");
            Ok(notify)
        })
    }

    fn store_notification_time(&self, user_key: &str) -> StorageRequest<()> {
        let request = self
            .database
            .submit(schema::upsert_notification_sql(user_key, util::now()));

        StorageRequest::new(async move {
            request.await?;
            Ok(())
        })
    }

    fn update(&self) {
        self.database.update();
    }
}
