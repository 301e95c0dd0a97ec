use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Periodically announce this worker to the coordinator until the
/// shutdown token fires. A missed heartbeat is logged and retried on the
/// next tick; the coordinator evicts us only after its TTL.
pub async fn heartbeat_loop(config: WorkerConfig, worker_id: String, shutdown: CancellationToken) {
    let http = reqwest::Client::new();
    let url = format!("http://{}/ping", config.coordinator_addr);
    let port = config.advertise_port.to_string();
    let mut interval =
        tokio::time::interval(Duration::from_millis(config.heartbeat_interval_ms));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(worker_id = %worker_id, "Heartbeat stopped");
                break;
            }
            _ = interval.tick() => {
                let result = http
                    .get(&url)
                    .query(&[("id", worker_id.as_str()), ("port", port.as_str())])
                    .send()
                    .await;
                if let Err(e) = result {
                    tracing::warn!(
                        coordinator = %config.coordinator_addr,
                        error = %e,
                        "Heartbeat failed"
                    );
                }
            }
        }
    }
}
