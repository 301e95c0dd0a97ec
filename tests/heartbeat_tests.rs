//! The worker heartbeat loop against a real coordinator.

mod common;

use std::time::Duration;

use common::TestCluster;
use ember::config::WorkerConfig;
use ember::worker;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn heartbeats_register_the_worker() {
    let cluster = TestCluster::start(0).await;

    let config = WorkerConfig::new(
        "127.0.0.1:9391".parse().unwrap(),
        cluster.coordinator_addr.clone(),
    )
    .with_heartbeat_interval_ms(50);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker::heartbeat_loop(
        config,
        "hbtst".to_string(),
        shutdown.clone(),
    ));

    // The first tick fires immediately; give it a few rounds.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let body = reqwest::get(format!("http://{}/workers", cluster.coordinator_addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("hbtst,127.0.0.1:9391"), "got: {body}");

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn ping_without_id_or_port_is_rejected() {
    let cluster = TestCluster::start(0).await;

    let response = reqwest::get(format!("http://{}/ping", cluster.coordinator_addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}
