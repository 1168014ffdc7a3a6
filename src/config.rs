use std::time::Duration;

/// Configuration for a consensus node.
///
/// All timing windows in the system are derived from `heartbeat_base_ms`:
/// the leader replicates at the base cadence, gossip announces run in a
/// [4, 5]x window, the liveness sweep in a [5, 6]x window, and election
/// timeouts in a [3, 6]x window.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Unique identifier for this node within the broker namespace.
    pub node_id: String,
    /// Subject prefix shared by all consensus peers. Direct addressing is
    /// `"<group>.<node_id>"`, role-broadcast is `"<group>.*"`.
    pub group: String,
    /// Fundamental timing unit in milliseconds.
    pub heartbeat_base_ms: u64,
    /// Deadline applied to every outbound `call`.
    pub rpc_timeout_ms: u64,
    /// Maximum number of ledger entries retained in memory.
    pub ledger_capacity: usize,
    /// Sweep cycles a silent peer survives before eviction.
    pub grace_cycles: u32,
    /// Announce cycles a learner observes before joining the electorate.
    pub bootstrap_cycles: u32,
    /// Fraction of normal job-queue prefetch capacity retained while
    /// acting as leader.
    pub leader_duty_ratio: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            group: "consensus".to_string(),
            heartbeat_base_ms: 50,
            rpc_timeout_ms: 100,
            ledger_capacity: 10_000,
            grace_cycles: 3,
            bootstrap_cycles: 2,
            leader_duty_ratio: 0.5,
        }
    }
}

impl CoreConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_heartbeat_base_ms(mut self, ms: u64) -> Self {
        self.heartbeat_base_ms = ms;
        self
    }

    pub fn with_rpc_timeout_ms(mut self, ms: u64) -> Self {
        self.rpc_timeout_ms = ms;
        self
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity;
        self
    }

    pub fn heartbeat_base(&self) -> Duration {
        Duration::from_millis(self.heartbeat_base_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
