use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gossip heartbeat broadcast by every peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    pub peer_id: String,
    pub joining: bool,
}

/// Liveness record for a known peer, owned by the tracker.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer_id: String,
    pub ttl: u32,
    pub last_seen: DateTime<Utc>,
}

impl PeerRecord {
    fn new(peer_id: String, ttl: u32) -> Self {
        Self {
            peer_id,
            ttl,
            last_seen: Utc::now(),
        }
    }
}

/// Predicate selecting the cohort: the subset of the quorum that shares
/// job-queue duty when this node leads.
pub type CohortPredicate = Arc<dyn Fn(&PeerRecord) -> bool + Send + Sync>;

/// Gossip-based membership tracker with TTL liveness decay.
///
/// Peers self-announce periodically; each announce refreshes the record's
/// ttl to `grace_cycles`. An independent, slower sweep decrements every
/// ttl and evicts records reaching zero, so a peer silent for
/// `grace_cycles` sweep periods is presumed dead.
pub struct MembershipTracker {
    peers: HashMap<String, PeerRecord>,
    grace_cycles: u32,
    cohort: CohortPredicate,
}

impl MembershipTracker {
    pub fn new(local_id: &str, grace_cycles: u32) -> Self {
        let local = local_id.to_string();
        Self::with_cohort(
            grace_cycles,
            Arc::new(move |record: &PeerRecord| record.peer_id != local),
        )
    }

    pub fn with_cohort(grace_cycles: u32, cohort: CohortPredicate) -> Self {
        Self {
            peers: HashMap::new(),
            grace_cycles: grace_cycles.max(1),
            cohort,
        }
    }

    /// Apply a gossip receipt. `joining = true` inserts or refreshes,
    /// `joining = false` is a graceful departure.
    pub fn observe(&mut self, peer_id: &str, joining: bool) {
        if joining {
            match self.peers.get_mut(peer_id) {
                Some(record) => {
                    record.ttl = self.grace_cycles;
                    record.last_seen = Utc::now();
                }
                None => {
                    tracing::info!(peer_id, "Peer joined quorum");
                    self.peers.insert(
                        peer_id.to_string(),
                        PeerRecord::new(peer_id.to_string(), self.grace_cycles),
                    );
                }
            }
        } else if self.peers.remove(peer_id).is_some() {
            tracing::info!(peer_id, "Peer left quorum");
        }
    }

    /// Decrement every ttl and evict records reaching zero. Returns the
    /// evicted peer ids.
    pub fn sweep(&mut self) -> Vec<String> {
        for record in self.peers.values_mut() {
            record.ttl = record.ttl.saturating_sub(1);
        }
        let evicted: Vec<String> = self
            .peers
            .values()
            .filter(|r| r.ttl == 0)
            .map(|r| r.peer_id.clone())
            .collect();
        for peer_id in &evicted {
            self.peers.remove(peer_id);
            tracing::warn!(peer_id = %peer_id, "Peer presumed dead, evicted from quorum");
        }
        evicted
    }

    /// Number of known live peers, the majority denominator.
    pub fn quorum_size(&self) -> usize {
        self.peers.len()
    }

    /// Votes needed to win an election over the current quorum.
    pub fn majority(&self) -> usize {
        self.quorum_size() / 2 + 1
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// The quorum subset sharing job-queue duty, per the injected
    /// predicate.
    pub fn cohort(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|r| (self.cohort)(r))
            .map(|r| r.peer_id.clone())
            .collect()
    }
}

impl std::fmt::Debug for MembershipTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipTracker")
            .field("peers", &self.peers)
            .field("grace_cycles", &self.grace_cycles)
            .finish()
    }
}
