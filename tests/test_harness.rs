//! Test harness for multi-node consensus clusters over the in-memory bus.
//!
//! Provides utilities for spawning, partitioning, and inspecting clusters.

// Each integration test binary uses a different slice of the harness.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use quorum_bus::config::CoreConfig;
use quorum_bus::core::{Core, CoreHandle, NodeStatus};
use quorum_bus::dispatch::QueueDispatcher;
use quorum_bus::role::RoleKind;
use quorum_bus::transport::MemoryBus;

pub const GROUP: &str = "consensus";

/// Node configuration with short windows for faster tests.
pub fn test_config(node_id: &str) -> CoreConfig {
    CoreConfig::new(node_id)
        .with_heartbeat_base_ms(20)
        .with_rpc_timeout_ms(50)
}

/// Dispatcher that records rebalance calls for assertions.
pub struct RecordingDispatcher {
    last_permille: AtomicU64,
    calls: AtomicU64,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            last_permille: AtomicU64::new(1000),
            calls: AtomicU64::new(0),
        })
    }

    pub fn last_ratio(&self) -> f64 {
        self.last_permille.load(Ordering::SeqCst) as f64 / 1000.0
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QueueDispatcher for RecordingDispatcher {
    fn rebalance(&self, duty_ratio: f64) {
        self.last_permille
            .store((duty_ratio * 1000.0).round() as u64, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle to a running test node.
pub struct TestNode {
    pub node_id: String,
    pub handle: CoreHandle,
    pub dispatcher: Arc<RecordingDispatcher>,
    run_handle: JoinHandle<()>,
}

impl TestNode {
    pub async fn status(&self) -> NodeStatus {
        self.handle.status().await.expect("core should be running")
    }

    pub async fn is_leader(&self) -> bool {
        self.status().await.role == RoleKind::Leader
    }

    pub fn subject(&self) -> String {
        format!("{GROUP}.{}", self.node_id)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.run_handle.abort();
    }
}

/// Test cluster managing multiple nodes on one bus.
pub struct TestCluster {
    pub bus: MemoryBus,
    pub nodes: HashMap<String, TestNode>,
}

impl TestCluster {
    /// Create and start a cluster with `num_nodes` nodes named n1..nN.
    pub async fn new(num_nodes: usize) -> Self {
        let bus = MemoryBus::new();
        let mut nodes = HashMap::new();
        for i in 0..num_nodes {
            let node_id = format!("n{}", i + 1);
            let node = Self::start_node(&bus, &node_id).await;
            nodes.insert(node_id, node);
        }
        Self { bus, nodes }
    }

    pub async fn start_node(bus: &MemoryBus, node_id: &str) -> TestNode {
        let config = test_config(node_id);
        let subject = format!("{GROUP}.{node_id}");
        let dispatcher = RecordingDispatcher::new();
        let endpoint = bus.endpoint(subject.clone());
        let (core, handle) = Core::new(config, Arc::new(endpoint), dispatcher.clone());
        bus.register(subject, Arc::new(handle.clone())).await;
        let run_handle = tokio::spawn(core.run());
        TestNode {
            node_id: node_id.to_string(),
            handle,
            dispatcher,
            run_handle,
        }
    }

    pub fn get(&self, node_id: &str) -> &TestNode {
        self.nodes.get(node_id).expect("unknown node")
    }

    pub async fn statuses(&self) -> Vec<NodeStatus> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.values() {
            out.push(node.status().await);
        }
        out
    }

    pub async fn count_leaders(&self) -> usize {
        self.statuses()
            .await
            .iter()
            .filter(|s| s.role == RoleKind::Leader)
            .count()
    }

    /// Wait until some node reports itself leader.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<String> {
        self.wait_for_leader_except(None, timeout).await
    }

    /// Wait until a node other than `exclude` reports itself leader.
    pub async fn wait_for_new_leader(&self, exclude: &str, timeout: Duration) -> Option<String> {
        self.wait_for_leader_except(Some(exclude), timeout).await
    }

    async fn wait_for_leader_except(
        &self,
        exclude: Option<&str>,
        timeout: Duration,
    ) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            for (id, node) in &self.nodes {
                if exclude == Some(id.as_str()) {
                    continue;
                }
                if node.is_leader().await {
                    return Some(id.clone());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }

    /// Wait until exactly one node is leader and every node agrees on it.
    pub async fn wait_for_agreement(&self, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            let statuses = self.statuses().await;
            let leaders: Vec<&NodeStatus> = statuses
                .iter()
                .filter(|s| s.role == RoleKind::Leader)
                .collect();
            if leaders.len() == 1 {
                let leader_id = leaders[0].node_id.clone();
                if statuses
                    .iter()
                    .all(|s| s.leader_id.as_deref() == Some(leader_id.as_str()))
                {
                    return Some(leader_id);
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }

    /// Cut a node off the bus in both directions.
    pub async fn partition(&self, node_id: &str) {
        self.bus.detach(&format!("{GROUP}.{node_id}")).await;
    }

    pub async fn heal(&self, node_id: &str) {
        self.bus.reattach(&format!("{GROUP}.{node_id}")).await;
    }

    /// Gracefully stop a node; it gossips a leave on the way out.
    pub async fn stop_node(&mut self, node_id: &str) {
        if let Some(node) = self.nodes.remove(node_id) {
            node.handle.shutdown();
            // Give the leave broadcast a moment to land before aborting.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn shutdown(self) {
        for node in self.nodes.values() {
            node.handle.shutdown();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
