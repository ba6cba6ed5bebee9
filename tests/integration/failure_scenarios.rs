//! Failure tests for the collector
//!
//! These tests verify that the collector handles failures gracefully:
//! - Clients that disconnect early
//! - Storage that cannot serve requests
//! - Storage that never answers
//! - Connections dropped while their database script is in flight

use std::{rc::Rc, time::Duration};

use metrics_collector::{
    database::{Database, PoolStats},
    http::{Message, Status},
    storage::{
        DatabaseMonitoringStorage, MemoryMonitoringStorage, MonitoringRecord, MonitoringStorage,
        StorageRequest,
    },
};
use pretty_assertions::assert_eq;
use tokio::{io::AsyncWriteExt, net::TcpStream, task::LocalSet};

use crate::helpers::*;

/// Accepts every operation and never completes any of them.
struct StalledStorage;

impl MonitoringStorage for StalledStorage {
    fn store_record(&self, _record: &MonitoringRecord) -> StorageRequest<()> {
        StorageRequest::new(std::future::pending())
    }

    fn check_notification_interval(&self, _user_key: &str, _period: Duration) -> StorageRequest<bool> {
        StorageRequest::new(std::future::pending())
    }

    fn store_notification_time(&self, _user_key: &str) -> StorageRequest<()> {
        StorageRequest::new(std::future::pending())
    }
}

#[tokio::test]
async fn test_client_disconnects_mid_request() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(MemoryMonitoringStorage::new());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                Rc::new(RecordingMailer::default()),
            )
            .await;

            let mut stream = TcpStream::connect(collector.address).await.unwrap();
            stream.write_all(b"POST /metrics?userKey=web_01 HTTP/1.1\r\nContent-Le").await.unwrap();
            drop(stream);

            // the collector keeps serving
            let response = collector
                .send(&metrics_request("web_01", "1", "1", "1").to_bytes())
                .await;
            assert_eq!(response.status(), Status::Ok);
            assert_eq!(storage.records().len(), 1);

            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_request_split_across_writes() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(MemoryMonitoringStorage::new());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                Rc::new(RecordingMailer::default()),
            )
            .await;

            let mut request = metrics_request("web_01", "1", "1", "1");
            request.set_body(b"ignored".to_vec());
            let raw = request.to_bytes();
            let (head, tail) = raw.split_at(raw.len() / 2);

            let mut stream = TcpStream::connect(collector.address).await.unwrap();
            stream.write_all(head).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            stream.write_all(tail).await.unwrap();

            let mut response = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
                .await
                .unwrap();
            assert_eq!(
                metrics_collector::http::Response::from_bytes(&response)
                    .unwrap()
                    .status(),
                Status::Ok
            );
            assert_eq!(storage.records().len(), 1);

            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_stalled_storage_does_not_block_other_connections() {
    LocalSet::new()
        .run_until(async {
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                Rc::new(StalledStorage),
                Rc::new(RecordingMailer::default()),
            )
            .await;

            // stays open waiting for storage
            let mut stalled = TcpStream::connect(collector.address).await.unwrap();
            stalled
                .write_all(&metrics_request("web_01", "1", "1", "1").to_bytes())
                .await
                .unwrap();

            // validation failures never reach storage and are answered at once
            let response = collector
                .send(&metrics_request("unknown", "1", "1", "1").to_bytes())
                .await;
            assert_eq!(response.status(), Status::BadRequest);

            // shutdown drops the stalled connection
            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_dropped_connection_abandons_database_request() {
    LocalSet::new()
        .run_until(async {
            let driver = GatedDriver::default();
            let storage = Rc::new(DatabaseMonitoringStorage::new(Database::new(driver.clone())));
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                Rc::new(RecordingMailer::default()),
            )
            .await;

            let mut client = TcpStream::connect(collector.address).await.unwrap();
            client
                .write_all(&metrics_request("web_01", "1", "1", "1").to_bytes())
                .await
                .unwrap();

            // wait until the record insert reached the driver
            while driver.executed() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert_eq!(storage.database().stats().pending, 1);

            collector.stop().await;
            drop(client);

            assert_eq!(
                storage.database().stats(),
                PoolStats {
                    idle: 0,
                    connecting: 0,
                    processing: 1,
                    pending: 0,
                }
            );

            driver.release();
            storage.update();

            assert_eq!(
                storage.database().stats(),
                PoolStats {
                    idle: 1,
                    connecting: 0,
                    processing: 0,
                    pending: 0,
                }
            );
            assert_eq!(driver.executed(), 1);
        })
        .await;
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_storage_failure_answers_500() {
    use metrics_collector::database::sqlite::SqliteDriver;

    LocalSet::new()
        .run_until(async {
            let temp_dir = tempfile::tempdir().unwrap();
            // no migrations: every statement fails
            let storage = DatabaseMonitoringStorage::new(Database::new(SqliteDriver::open(
                temp_dir.path().join("empty.db"),
            )));
            let mail = Rc::new(RecordingMailer::default());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                Rc::new(storage),
                mail.clone(),
            )
            .await;

            for _ in 0..2 {
                let response = collector
                    .send(&metrics_request("web_01", "99", "1", "1").to_bytes())
                    .await;
                assert_eq!(response.status(), Status::InternalServerError);
            }
            assert!(mail.sent().is_empty());

            collector.stop().await;
        })
        .await;
}
