//! End-to-end tests: requests over TCP into a running collector
//!
//! Covers the full path through validation, storage, limit evaluation,
//! notification throttling and the mail hand-off.

use std::rc::Rc;

use metrics_collector::{
    http::{Message, Status},
    storage::{MemoryMonitoringStorage, MonitoringStorage},
};
use pretty_assertions::assert_eq;
use tokio::task::LocalSet;

use crate::helpers::*;

#[tokio::test]
async fn test_unknown_user_key_is_rejected_before_storage() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(CountingStorage::new(MemoryMonitoringStorage::new()));
            let mail = Rc::new(RecordingMailer::default());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                mail.clone(),
            )
            .await;

            let response = collector
                .send(&metrics_request("db_01", "10", "10", "10").to_bytes())
                .await;

            assert_eq!(response.status(), Status::BadRequest);
            assert_eq!(storage.stored_records.get(), 0);
            assert!(mail.sent().is_empty());

            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_metrics_below_limits_are_stored_without_mail() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(CountingStorage::new(MemoryMonitoringStorage::new()));
            let mail = Rc::new(RecordingMailer::default());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                mail.clone(),
            )
            .await;

            let response = collector
                .send(&metrics_request("web_01", "50", "80", "200").to_bytes())
                .await;

            assert_eq!(response.status(), Status::Ok);
            assert!(response.body().is_empty());
            assert_eq!(storage.inner.records().len(), 1);
            assert_eq!(storage.interval_checks.get(), 0);
            assert!(mail.sent().is_empty());

            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_invalid_values_are_rejected() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(CountingStorage::new(MemoryMonitoringStorage::new()));
            let mail = Rc::new(RecordingMailer::default());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                mail.clone(),
            )
            .await;

            let invalid = [
                metrics_request("web_01", "10", "10", "007").to_bytes(),
                metrics_request("web_01", "101", "10", "10").to_bytes(),
                b"POST /metrics?userKey=web_01&cpuUsage=10 HTTP/1.1\r\n\r\n".to_vec(),
                b"POST /metrics?userKey=web_01&timestamp=2025-10-16 HTTP/1.1\r\n\r\n".to_vec(),
                b"PUT /metrics HTTP/1.1\r\n\r\n".to_vec(),
                b"POST /metrics HTTP/1.1\r\nHost: a\r\nhost: b\r\n\r\n".to_vec(),
            ];
            for raw in invalid {
                let response = collector.send(&raw).await;
                assert_eq!(
                    response.status(),
                    Status::BadRequest,
                    "{}",
                    String::from_utf8_lossy(&raw)
                );
            }

            assert_eq!(storage.stored_records.get(), 0);
            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_empty_metrics_are_stored_as_absent() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(MemoryMonitoringStorage::new());
            let mail = Rc::new(RecordingMailer::default());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 0, 0, 0)]),
                storage.clone(),
                mail.clone(),
            )
            .await;

            let response = collector
                .send(&metrics_request("web_01", "", "", "").to_bytes())
                .await;
            assert_eq!(response.status(), Status::Ok);

            let records = storage.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].cpu_usage, None);
            assert_eq!(records[0].memory_usage, None);
            assert_eq!(records[0].process_count, None);
            // nothing measured, nothing exceeded
            assert!(mail.sent().is_empty());

            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_every_breached_limit_is_reported() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(MemoryMonitoringStorage::new());
            let mail = Rc::new(RecordingMailer::default());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                mail.clone(),
            )
            .await;

            let response = collector
                .send(&metrics_request("web_01", "60", "90", "300").to_bytes())
                .await;
            assert_eq!(response.status(), Status::Ok);

            let sent = mail.sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].recipient, "web_01@example.com");
            assert_eq!(
                sent[0].body,
                "Client web_01 exceeded its resource limits:\n\n\
                 CPU Usage: detected value: 60%, limit: 50%\n\
                 Memory Usage: detected value: 90%, limit: 80%\n\
                 Process Count: detected value: 300, limit: 200\n"
            );

            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_memory_storage_throttles_notifications() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(CountingStorage::new(MemoryMonitoringStorage::new()));
            let mail = Rc::new(RecordingMailer::default());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                mail.clone(),
            )
            .await;

            for _ in 0..3 {
                let response = collector
                    .send(&metrics_request("web_01", "99", "", "").to_bytes())
                    .await;
                assert_eq!(response.status(), Status::Ok);
            }

            assert_eq!(storage.stored_records.get(), 3);
            assert_eq!(storage.interval_checks.get(), 3);
            assert_eq!(storage.notification_times.get(), 1);
            assert_eq!(mail.sent().len(), 1);

            collector.stop().await;
        })
        .await;
}

#[cfg(feature = "storage-sqlite")]
mod sqlite {
    use chrono::TimeDelta;
    use metrics_collector::{
        storage::{SqliteMonitoringStorage, schema},
        util,
    };

    use pretty_assertions::assert_eq;

    use super::*;

    async fn seed_notification(storage: &SqliteMonitoringStorage, user_key: &str, age: TimeDelta) {
        use futures::FutureExt;

        let sql = schema::upsert_notification_sql(user_key, util::now() - age);
        let mut request = storage.database().submit(sql);
        loop {
            storage.update();
            if let Some(result) = (&mut request).now_or_never() {
                result.unwrap();
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_breach_without_prior_notification_sends_mail() {
        LocalSet::new()
            .run_until(async {
                let temp_dir = tempfile::tempdir().unwrap();
                let storage = Rc::new(CountingStorage::new(
                    SqliteMonitoringStorage::open(temp_dir.path().join("collector.db"))
                        .await
                        .unwrap(),
                ));
                let mail = Rc::new(RecordingMailer::default());
                let collector = TestCollector::start(
                    create_config([create_client("web_01", 50, 80, 200)]),
                    storage.clone(),
                    mail.clone(),
                )
                .await;

                let response = collector
                    .send(&metrics_request("web_01", "75", "10", "10").to_bytes())
                    .await;
                assert_eq!(response.status(), Status::Ok);

                let sent = mail.sent();
                assert_eq!(sent.len(), 1);
                let limit_lines: Vec<_> = sent[0]
                    .body
                    .lines()
                    .filter(|line| line.contains("detected value"))
                    .collect();
                assert_eq!(
                    limit_lines,
                    vec!["CPU Usage: detected value: 75%, limit: 50%"]
                );
                assert_eq!(storage.notification_times.get(), 1);

                // the notification time is now persisted
                let check = storage
                    .inner
                    .check_notification_interval("web_01", std::time::Duration::from_secs(300));
                assert!(!wait_for(&storage.inner, check).await.unwrap());

                collector.stop().await;
            })
            .await;
    }

    #[tokio::test]
    async fn test_recent_notification_suppresses_mail() {
        LocalSet::new()
            .run_until(async {
                let temp_dir = tempfile::tempdir().unwrap();
                let storage = SqliteMonitoringStorage::open(temp_dir.path().join("collector.db"))
                    .await
                    .unwrap();
                seed_notification(&storage, "web_01", TimeDelta::seconds(5)).await;

                let storage = Rc::new(CountingStorage::new(storage));
                let mail = Rc::new(RecordingMailer::default());
                let collector = TestCollector::start(
                    create_config([create_client("web_01", 50, 80, 200)]),
                    storage.clone(),
                    mail.clone(),
                )
                .await;

                let response = collector
                    .send(&metrics_request("web_01", "75", "10", "10").to_bytes())
                    .await;

                assert_eq!(response.status(), Status::Ok);
                assert_eq!(storage.stored_records.get(), 1);
                assert_eq!(storage.interval_checks.get(), 1);
                assert_eq!(storage.notification_times.get(), 0);
                assert!(mail.sent().is_empty());

                collector.stop().await;
            })
            .await;
    }

    #[tokio::test]
    async fn test_expired_notification_allows_mail() {
        LocalSet::new()
            .run_until(async {
                let temp_dir = tempfile::tempdir().unwrap();
                let storage = SqliteMonitoringStorage::open(temp_dir.path().join("collector.db"))
                    .await
                    .unwrap();
                seed_notification(&storage, "web_01", TimeDelta::seconds(301)).await;

                let mail = Rc::new(RecordingMailer::default());
                let collector = TestCollector::start(
                    create_config([create_client("web_01", 50, 80, 200)]),
                    Rc::new(storage),
                    mail.clone(),
                )
                .await;

                let response = collector
                    .send(&metrics_request("web_01", "75", "10", "10").to_bytes())
                    .await;

                assert_eq!(response.status(), Status::Ok);
                assert_eq!(mail.sent().len(), 1);

                collector.stop().await;
            })
            .await;
    }
}
