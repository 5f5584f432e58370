// src/core/cluster/client.rs

//! HTTP client for peer-to-peer cluster calls. Heartbeats and control
//! messages are best-effort: failures are reported to the caller, which
//! logs and moves on.

use super::{ClusterStateSnapshot, HeartbeatMessage};
use crate::core::errors::LogLensError;
use serde_json::json;
use std::time::Duration;

/// Soft deadline for heartbeat and control-plane requests.
const PEER_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ClusterClient {
    http: reqwest::Client,
}

impl Default for ClusterClient {
    fn default() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(PEER_TIMEOUT)
                .build()
                .expect("cluster http client"),
        }
    }
}

impl ClusterClient {
    pub fn new() -> Self {
        Default::default()
    }

    pub async fn post_heartbeat(
        &self,
        base_url: &str,
        message: &HeartbeatMessage,
    ) -> Result<(), LogLensError> {
        let endpoint = format!("{}/api/cluster/heartbeat", base_url.trim_end_matches('/'));
        self.http
            .post(&endpoint)
            .json(message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn post_leader_change(
        &self,
        base_url: &str,
        state: &ClusterStateSnapshot,
    ) -> Result<(), LogLensError> {
        let endpoint = format!("{}/api/cluster/leader-change", base_url.trim_end_matches('/'));
        self.http
            .post(&endpoint)
            .json(state)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn post_node_leaving(
        &self,
        base_url: &str,
        node_id: &str,
    ) -> Result<(), LogLensError> {
        let endpoint = format!("{}/api/cluster/node-leaving", base_url.trim_end_matches('/'));
        self.http
            .post(&endpoint)
            .json(&json!({ "nodeId": node_id }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
