use std::{path::Path, time::Duration};

use futures::TryStreamExt;
use sqlx::{
    Column, Connection, Either, Row, SqliteConnection, ValueRef,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous},
};
use tracing::trace;

use super::{
    DatabaseError, QueryResults, ResultSet,
    driver::{ConnectFuture, Driver, QueryCompletion, QueryFuture},
};

/// SQLite through `sqlx`. Each connection runs its statements on its own
/// worker thread, so polling never blocks the reactor.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    options: SqliteConnectOptions,
}

impl SqliteDriver {
    pub fn new(options: SqliteConnectOptions) -> SqliteDriver {
        Self { options }
    }

    /// Driver for the database file at `path`, created if missing.
    pub fn open(path: impl AsRef<Path>) -> SqliteDriver {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        Self::new(options)
    }

    pub fn options(&self) -> &SqliteConnectOptions {
        &self.options
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn connect(&self) -> ConnectFuture<SqliteConnection> {
        let options = self.options.clone();
        Box::pin(async move {
            trace!("opening sqlite connection to {:?}", options.get_filename());
            SqliteConnection::connect_with(&options)
                .await
                .map_err(|e| DatabaseError::ConnectFailed(e.to_string()))
        })
    }

    fn execute(&self, mut connection: SqliteConnection, sql: String) -> QueryFuture<SqliteConnection> {
        Box::pin(async move {
            match run_script(&mut connection, &sql).await {
                Ok(results) => QueryCompletion {
                    connection: Some(connection),
                    outcome: Ok(results),
                },
                Err(e) if is_transport_error(&e) => QueryCompletion {
                    connection: None,
                    outcome: Err(DatabaseError::ConnectionLost(e.to_string())),
                },
                Err(e) => QueryCompletion {
                    connection: Some(connection),
                    outcome: Err(DatabaseError::QueryFailed(e.to_string())),
                },
            }
        })
    }
}

async fn run_script(connection: &mut SqliteConnection, sql: &str) -> Result<QueryResults, sqlx::Error> {
    let mut results = QueryResults::default();
    let mut current = ResultSet::default();

    let mut steps = sqlx::raw_sql(sql).fetch_many(connection);
    while let Some(step) = steps.try_next().await? {
        match step {
            // end of one statement
            Either::Left(_) => results.push(std::mem::take(&mut current)),
            Either::Right(row) => {
                if current.columns().is_empty() {
                    current.set_columns(row.columns().iter().map(|c| c.name().to_string()).collect());
                }
                current.push_row(row_values(&row)?);
            }
        }
    }

    Ok(results)
}

fn row_values(row: &SqliteRow) -> Result<Vec<Option<String>>, sqlx::Error> {
    (0..row.len())
        .map(|i| {
            if row.try_get_raw(i)?.is_null() {
                Ok(None)
            } else {
                row.try_get_unchecked::<String, _>(i).map(Some)
            }
        })
        .collect()
}

fn is_transport_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed | sqlx::Error::Protocol(_)
    )
}
