//! Agent pushing samples to an in-process collector

use std::{rc::Rc, time::Duration};

use metrics_collector::{
    agent::{Agent, FixedSystemMetrics, Sample},
    config::AgentConfig,
    http::Status,
    storage::MemoryMonitoringStorage,
};
use pretty_assertions::assert_eq;
use tokio::task::LocalSet;

use crate::helpers::*;

fn agent_config(key: &str, port: u16) -> AgentConfig {
    AgentConfig {
        key: key.to_string(),
        update_interval: Duration::from_secs(1),
        host: "localhost".to_string(),
        port,
    }
}

#[tokio::test]
async fn test_agent_sample_is_stored() {
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

            let sample = Sample {
                cpu_usage: Some(70),
                memory_usage: None,
                process_count: Some(12),
            };
            let mut agent = Agent::new(
                agent_config("web_01", collector.address.port()),
                FixedSystemMetrics(sample),
            );

            assert_eq!(agent.push_once().await.unwrap(), Status::Ok);

            let records = storage.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].user_key, "web_01");
            assert_eq!(records[0].cpu_usage, Some(70));
            assert_eq!(records[0].memory_usage, None);
            assert_eq!(records[0].process_count, Some(12));
            assert_eq!(mail.sent().len(), 1);

            collector.stop().await;
        })
        .await;
}

#[tokio::test]
async fn test_unknown_agent_is_refused() {
    LocalSet::new()
        .run_until(async {
            let storage = Rc::new(MemoryMonitoringStorage::new());
            let collector = TestCollector::start(
                create_config([create_client("web_01", 50, 80, 200)]),
                storage.clone(),
                Rc::new(RecordingMailer::default()),
            )
            .await;

            let mut agent = Agent::new(
                agent_config("db_01", collector.address.port()),
                FixedSystemMetrics::default(),
            );

            assert_eq!(agent.push_once().await.unwrap(), Status::BadRequest);
            assert!(storage.records().is_empty());

            collector.stop().await;
        })
        .await;
}
