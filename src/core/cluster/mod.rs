// src/core/cluster/mod.rs

//! Cluster membership, failure detection, and leader election. Every node
//! heartbeats to every known peer over HTTP; peers whose heartbeat goes
//! stale are dropped, and the leader is always the lexicographically
//! smallest live node id. Peers are registered with the shard router on
//! first contact and de-registered when they leave or expire.

pub mod client;

use crate::core::model::now_millis;
use crate::core::shard::ShardRouter;
use client::ClusterClient;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    pub id: String,
    pub url: String,
    pub last_heartbeat: i64,
    pub alive: bool,
}

/// The peer heartbeat wire message. `node_url` lets a previously unknown
/// peer be registered on first contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMessage {
    pub node_id: String,
    pub node_url: String,
    pub timestamp: i64,
    pub is_leader: bool,
}

/// The serialized cluster view sent on leader changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStateSnapshot {
    pub nodes: Vec<ClusterNode>,
    pub leader_id: Option<String>,
}

pub struct ClusterMembership {
    node_id: String,
    node_url: String,
    heartbeat_interval: Duration,
    leader_check_interval: Duration,
    heartbeat_timeout_ms: i64,
    nodes: DashMap<String, ClusterNode>,
    leader_id: RwLock<Option<String>>,
    is_leader: AtomicBool,
    router: Arc<ShardRouter>,
    client: ClusterClient,
}

impl ClusterMembership {
    pub fn new(
        node_id: String,
        node_url: String,
        heartbeat_interval: Duration,
        leader_check_interval: Duration,
        heartbeat_timeout_ms: i64,
        seed_nodes: Vec<(String, String)>,
        router: Arc<ShardRouter>,
    ) -> Self {
        let membership = Self {
            node_id: node_id.clone(),
            node_url: node_url.clone(),
            heartbeat_interval,
            leader_check_interval,
            heartbeat_timeout_ms,
            nodes: DashMap::new(),
            leader_id: RwLock::new(None),
            is_leader: AtomicBool::new(false),
            router,
            client: ClusterClient::new(),
        };

        // Register self, then any statically configured peers (discovery is
        // pluggable and a no-op by default).
        membership.upsert_node(&node_id, &node_url);
        for (id, url) in seed_nodes {
            if id != membership.node_id {
                membership.upsert_node(&id, &url);
            }
        }
        membership.elect();
        membership
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    pub fn leader_id(&self) -> Option<String> {
        self.leader_id.read().clone()
    }

    pub fn snapshot(&self) -> ClusterStateSnapshot {
        let mut nodes: Vec<ClusterNode> = self.nodes.iter().map(|e| e.value().clone()).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        ClusterStateSnapshot {
            nodes,
            leader_id: self.leader_id(),
        }
    }

    fn upsert_node(&self, id: &str, url: &str) {
        self.nodes.insert(
            id.to_string(),
            ClusterNode {
                id: id.to_string(),
                url: url.to_string(),
                last_heartbeat: now_millis(),
                alive: true,
            },
        );
        self.router.register_node(id, url);
    }

    /// Handles an inbound peer heartbeat: upsert, and accept a claimed
    /// leadership when it differs from the current view.
    pub fn handle_heartbeat(&self, message: &HeartbeatMessage) {
        self.upsert_node(&message.node_id, &message.node_url);

        if message.is_leader {
            let mut leader = self.leader_id.write();
            if leader.as_deref() != Some(message.node_id.as_str()) {
                info!("Accepting leadership claim from node '{}'.", message.node_id);
                *leader = Some(message.node_id.clone());
                self.is_leader
                    .store(message.node_id == self.node_id, Ordering::SeqCst);
            }
        }
    }

    /// Handles a leader-change broadcast from a peer.
    pub fn handle_leader_change(&self, state: &ClusterStateSnapshot) {
        for node in &state.nodes {
            if node.id != self.node_id {
                self.upsert_node(&node.id, &node.url);
            }
        }
        if let Some(leader) = &state.leader_id {
            info!("Cluster leader changed to '{}'.", leader);
            *self.leader_id.write() = Some(leader.clone());
            self.is_leader
                .store(leader == &self.node_id, Ordering::SeqCst);
        }
    }

    /// Handles a peer announcing departure.
    pub fn node_leaving(&self, node_id: &str) {
        if node_id == self.node_id {
            return;
        }
        if self.nodes.remove(node_id).is_some() {
            info!("Node '{}' left the cluster.", node_id);
            self.router.remove_node(node_id);
        }
        if self.leader_id.read().as_deref() == Some(node_id) {
            self.elect();
        }
    }

    /// Drops peers whose heartbeat has expired. Returns the removed ids.
    fn expire_peers(&self) -> Vec<String> {
        let threshold = now_millis() - self.heartbeat_timeout_ms;
        let expired: Vec<String> = self
            .nodes
            .iter()
            .filter(|e| e.key() != &self.node_id && e.value().last_heartbeat < threshold)
            .map(|e| e.key().clone())
            .collect();
        for id in &expired {
            warn!("Node '{}' missed its heartbeat window; removing.", id);
            self.nodes.remove(id);
            self.router.remove_node(id);
        }
        expired
    }

    /// Elects the lexicographically smallest live node id. Returns true when
    /// this node just became leader.
    fn elect(&self) -> bool {
        let mut ids: Vec<String> = self.nodes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        let new_leader = ids.into_iter().next();

        let mut leader = self.leader_id.write();
        let changed = *leader != new_leader;
        if changed {
            info!(
                "Elected cluster leader: {}.",
                new_leader.as_deref().unwrap_or("<none>")
            );
        }
        *leader = new_leader.clone();
        let self_is_leader = new_leader.as_deref() == Some(self.node_id.as_str());
        let was_leader = self.is_leader.swap(self_is_leader, Ordering::SeqCst);
        self_is_leader && !was_leader
    }

    /// One heartbeat cycle: refresh self, ping peers, expire the silent, and
    /// re-elect when the leader fell out.
    pub async fn heartbeat_cycle(&self) {
        if let Some(mut me) = self.nodes.get_mut(&self.node_id) {
            me.last_heartbeat = now_millis();
        }

        let message = HeartbeatMessage {
            node_id: self.node_id.clone(),
            node_url: self.node_url.clone(),
            timestamp: now_millis(),
            is_leader: self.is_leader(),
        };
        let peers: Vec<(String, String)> = self
            .nodes
            .iter()
            .filter(|e| e.key() != &self.node_id)
            .map(|e| (e.key().clone(), e.value().url.clone()))
            .collect();
        for (id, url) in peers {
            if let Err(e) = self.client.post_heartbeat(&url, &message).await {
                debug!("Heartbeat to node '{}' failed: {}", id, e);
            }
        }

        let expired = self.expire_peers();
        let leader_expired = match self.leader_id.read().as_deref() {
            Some(leader) => expired.iter().any(|id| id == leader),
            None => true,
        };
        if leader_expired && self.elect() {
            self.announce_leadership().await;
        }
    }

    /// Verifies that the current leader is still live and re-elects if not.
    /// Runs on its own period so a silent leader is caught even between
    /// heartbeat rounds.
    pub async fn leader_check(&self) {
        let threshold = now_millis() - self.heartbeat_timeout_ms;
        let leader_alive = self
            .leader_id
            .read()
            .as_deref()
            .and_then(|leader| self.nodes.get(leader))
            .is_some_and(|node| node.last_heartbeat >= threshold || node.id == self.node_id);
        if !leader_alive {
            self.expire_peers();
            if self.elect() {
                self.announce_leadership().await;
            }
        }
    }

    /// Publishes a leader-change message to every peer. Called when this
    /// node wins an election; the redistribution hook for ingestion
    /// partitioning keys off the refreshed membership automatically.
    async fn announce_leadership(&self) {
        let state = self.snapshot();
        let peers: Vec<(String, String)> = state
            .nodes
            .iter()
            .filter(|n| n.id != self.node_id)
            .map(|n| (n.id.clone(), n.url.clone()))
            .collect();
        for (id, url) in peers {
            if let Err(e) = self.client.post_leader_change(&url, &state).await {
                warn!("Failed to announce leadership to node '{}': {}", id, e);
            }
        }
    }

    /// Notifies peers that this node is shutting down.
    pub async fn announce_leaving(&self) {
        let peers: Vec<String> = self
            .nodes
            .iter()
            .filter(|e| e.key() != &self.node_id)
            .map(|e| e.value().url.clone())
            .collect();
        for url in peers {
            if let Err(e) = self.client.post_node_leaving(&url, &self.node_id).await {
                debug!("node-leaving notification to {} failed: {}", url, e);
            }
        }
    }
}

/// The periodic heartbeat task wrapping a membership handle.
pub struct HeartbeatTask {
    membership: Arc<ClusterMembership>,
}

impl HeartbeatTask {
    pub fn new(membership: Arc<ClusterMembership>) -> Self {
        Self { membership }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Cluster heartbeat task started (node '{}').",
            self.membership.node_id()
        );
        let mut heartbeat = tokio::time::interval(self.membership.heartbeat_interval);
        let mut leader_check = tokio::time::interval(self.membership.leader_check_interval);
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    self.membership.heartbeat_cycle().await;
                }
                _ = leader_check.tick() => {
                    self.membership.leader_check().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Cluster heartbeat task shutting down.");
                    self.membership.announce_leaving().await;
                    return;
                }
            }
        }
    }
}

/// Derives the node identity: the configured id, or `hostname-<8hex>`.
pub fn derive_node_id(configured: Option<&str>) -> String {
    if let Some(id) = configured
        && !id.trim().is_empty()
    {
        return id.trim().to_string();
    }
    let host = sysinfo::System::host_name().unwrap_or_else(|| "node".to_string());
    let mut suffix = [0u8; 4];
    if getrandom::fill(&mut suffix).is_err() {
        warn!("Falling back to a time-derived node id suffix.");
        let ts = now_millis() as u32;
        suffix = ts.to_be_bytes();
    }
    format!("{}-{}", host, hex::encode(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::SearchCache;
    use crate::core::events::RecordEventBus;
    use crate::core::index::bucket::BucketType;
    use crate::core::index::fields::FieldRegistry;
    use crate::core::index::{IndexOptions, PartitionedIndex};
    use crate::core::shard::ShardingType;
    use tempfile::TempDir;

    fn membership(dir: &TempDir, node_id: &str, seeds: Vec<(String, String)>) -> ClusterMembership {
        let cache = Arc::new(SearchCache::new(10, 60_000, true));
        let index = Arc::new(
            PartitionedIndex::open(
                IndexOptions {
                    base_dir: dir.path().to_path_buf(),
                    partitioning_enabled: true,
                    bucket_type: BucketType::Daily,
                    max_active_partitions: 7,
                    auto_archive: false,
                },
                Arc::new(FieldRegistry::default()),
                cache.clone(),
                Arc::new(RecordEventBus::new()),
                None,
            )
            .unwrap(),
        );
        let router = Arc::new(ShardRouter::new(
            true,
            node_id.to_string(),
            ShardingType::Balanced,
            2,
            index,
            cache,
        ));
        ClusterMembership::new(
            node_id.to_string(),
            format!("http://{node_id}:8080"),
            Duration::from_secs(5),
            Duration::from_secs(10),
            15_000,
            seeds,
            router,
        )
    }

    #[test]
    fn single_node_elects_itself() {
        let dir = TempDir::new().unwrap();
        let m = membership(&dir, "node-b", Vec::new());
        assert!(m.is_leader());
        assert_eq!(m.leader_id(), Some("node-b".to_string()));
    }

    #[test]
    fn smallest_id_wins_election() {
        let dir = TempDir::new().unwrap();
        let m = membership(
            &dir,
            "node-b",
            vec![("node-a".to_string(), "http://node-a:8080".to_string())],
        );
        assert!(!m.is_leader());
        assert_eq!(m.leader_id(), Some("node-a".to_string()));
    }

    #[test]
    fn heartbeat_registers_peer_with_router() {
        let dir = TempDir::new().unwrap();
        let m = membership(&dir, "node-a", Vec::new());
        m.handle_heartbeat(&HeartbeatMessage {
            node_id: "node-b".into(),
            node_url: "http://node-b:8080".into(),
            timestamp: now_millis(),
            is_leader: false,
        });
        assert_eq!(m.router.node_ids(), vec!["node-a", "node-b"]);
    }

    #[test]
    fn leadership_claim_is_accepted() {
        let dir = TempDir::new().unwrap();
        let m = membership(&dir, "node-b", Vec::new());
        assert!(m.is_leader());
        m.handle_heartbeat(&HeartbeatMessage {
            node_id: "node-a".into(),
            node_url: "http://node-a:8080".into(),
            timestamp: now_millis(),
            is_leader: true,
        });
        assert!(!m.is_leader());
        assert_eq!(m.leader_id(), Some("node-a".to_string()));
    }

    #[test]
    fn leaving_leader_triggers_reelection() {
        let dir = TempDir::new().unwrap();
        let m = membership(
            &dir,
            "node-b",
            vec![("node-a".to_string(), "http://node-a:8080".to_string())],
        );
        assert_eq!(m.leader_id(), Some("node-a".to_string()));
        m.node_leaving("node-a");
        assert_eq!(m.leader_id(), Some("node-b".to_string()));
        assert!(m.is_leader());
        assert_eq!(m.router.node_ids(), vec!["node-b"]);
    }

    #[test]
    fn derive_node_id_prefers_configured() {
        assert_eq!(derive_node_id(Some("custom")), "custom");
        let generated = derive_node_id(None);
        let suffix = generated.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
