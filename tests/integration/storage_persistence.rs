//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Samples and notification times survive a restart
//! - Opening an existing database does not re-run migrations destructively

use std::time::Duration;

use futures::FutureExt;
use metrics_collector::{
    database::QueryResults,
    storage::{MonitoringRecord, MonitoringStorage, SqliteMonitoringStorage},
    util,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::wait_for;

async fn select(storage: &SqliteMonitoringStorage, sql: &str) -> QueryResults {
    let mut request = storage.database().submit(sql);
    loop {
        storage.update();
        if let Some(result) = (&mut request).now_or_never() {
            return result.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("collector.db");

    {
        let storage = SqliteMonitoringStorage::open(&db_path).await.unwrap();
        for cpu in [10, 20, 30] {
            let record = MonitoringRecord {
                user_key: "web_01".to_string(),
                timestamp: util::now(),
                cpu_usage: Some(cpu),
                memory_usage: Some(40),
                process_count: None,
            };
            wait_for(&storage, storage.store_record(&record)).await.unwrap();
        }
        wait_for(&storage, storage.store_notification_time("web_01"))
            .await
            .unwrap();
    }

    let storage = SqliteMonitoringStorage::open(&db_path).await.unwrap();

    let rows = select(&storage, "SELECT cpu_usage FROM statistics ORDER BY cpu_usage").await;
    assert_eq!(rows.row_count(0), 3);
    assert_eq!(rows.value(0, 2, 0), Some("30"));

    let check = storage.check_notification_interval("web_01", Duration::from_secs(3600));
    assert!(!wait_for(&storage, check).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_requests_share_connections() {
    let temp_dir = tempdir().unwrap();
    let storage = SqliteMonitoringStorage::open(temp_dir.path().join("collector.db"))
        .await
        .unwrap();

    let requests: Vec<_> = (0..8)
        .map(|i| {
            storage.store_record(&MonitoringRecord {
                user_key: format!("client_{i}"),
                timestamp: util::now(),
                cpu_usage: None,
                memory_usage: None,
                process_count: Some(i),
            })
        })
        .collect();

    for request in requests {
        wait_for(&storage, request).await.unwrap();
    }

    let stats = storage.database().stats();
    assert_eq!(stats.pending, 0);
    assert!(stats.idle >= 1 && stats.idle <= 8);

    let rows = select(&storage, "SELECT COUNT(*) FROM statistics").await;
    assert_eq!(rows.value(0, 0, 0), Some("8"));
}
