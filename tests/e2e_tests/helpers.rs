//! Shared setup for e2e scenarios

use builds_e2e::config::E2eConfig;
use builds_e2e::kube_utils::create_client;
use builds_e2e::telemetry::init_logging;
use kube::Client;

/// Load config, initialize logging once, and connect to the cluster
pub async fn setup() -> Result<(E2eConfig, Client), String> {
    // Already installed by an earlier test in this binary
    let _ = init_logging(false);

    let config = E2eConfig::from_env().map_err(|e| e.to_string())?;
    let client = create_client(config.kubeconfig.as_deref())
        .await
        .map_err(|e| format!("failed to connect to cluster: {}", e))?;
    Ok((config, client))
}
