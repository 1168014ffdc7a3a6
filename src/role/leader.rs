use std::collections::{BTreeMap, HashMap};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ConsensusError, Result};
use crate::ledger::Ledger;
use crate::rpc::{Response, StoreResponse};
use crate::state::NodeState;
use crate::timer::RandomizedTimer;

use super::{RoleCtx, RoleEvent};

/// A caller waiting for its stored command to commit. Local waiters come
/// through `CoreHandle::store`, remote ones through a RequestStore RPC.
pub enum StoreWaiter {
    Local(oneshot::Sender<Result<u64>>),
    Remote(oneshot::Sender<Result<Response>>),
}

impl StoreWaiter {
    pub fn resolve_committed(self, index: u64) {
        match self {
            StoreWaiter::Local(tx) => {
                let _ = tx.send(Ok(index));
            }
            StoreWaiter::Remote(tx) => {
                let _ = tx.send(Ok(Response::RequestStore(StoreResponse {
                    index,
                    committed: true,
                })));
            }
        }
    }

    pub fn resolve_not_leader(self, leader_id: Option<String>) {
        self.resolve_error(ConsensusError::NotLeader(leader_id));
    }

    pub fn resolve_error(self, err: ConsensusError) {
        match self {
            StoreWaiter::Local(tx) => {
                let _ = tx.send(Err(err));
            }
            StoreWaiter::Remote(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

/// The elected leader: replicates its ledger to the quorum at the
/// heartbeat base cadence and resolves store requests once a majority has
/// acknowledged them.
pub struct Leader {
    token: CancellationToken,
    timers: Vec<RandomizedTimer>,
    next_index: HashMap<String, u64>,
    match_index: HashMap<String, u64>,
    pending: BTreeMap<u64, Vec<StoreWaiter>>,
    /// Idempotency cache: request id to appended index, so a replayed
    /// RequestStore resolves to the original entry.
    recent_requests: HashMap<Uuid, u64>,
}

impl Leader {
    pub fn new(last_index: u64, peers: impl IntoIterator<Item = String>) -> Self {
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for peer in peers {
            next_index.insert(peer.clone(), last_index + 1);
            match_index.insert(peer, 0);
        }
        Self {
            token: CancellationToken::new(),
            timers: Vec::new(),
            next_index,
            match_index,
            pending: BTreeMap::new(),
            recent_requests: HashMap::new(),
        }
    }

    pub fn start(&mut self, ctx: &RoleCtx) {
        let events = ctx.events.clone();
        let base = ctx.heartbeat_base;
        // Fire immediately: the first heartbeat asserts leadership without
        // waiting a full cadence.
        self.timers.push(RandomizedTimer::spawn_scoped(
            self.token.clone(),
            move || base,
            move |_| {
                let _ = events.send(RoleEvent::ReplicateTick);
            },
            true,
        ));
    }

    /// Peers discovered after promotion start from the current tail.
    pub fn ensure_peer(&mut self, peer: &str, last_index: u64) {
        self.next_index
            .entry(peer.to_string())
            .or_insert(last_index + 1);
        self.match_index.entry(peer.to_string()).or_insert(0);
    }

    pub fn next_for(&self, peer: &str) -> u64 {
        self.next_index.get(peer).copied().unwrap_or(1)
    }

    pub fn record_success(&mut self, peer: &str, match_index: u64) {
        self.match_index.insert(peer.to_string(), match_index);
        self.next_index.insert(peer.to_string(), match_index + 1);
    }

    /// After a rejection, jump `next_index` back to the start of the term
    /// the failed probe landed in, clamped by the follower's last-index
    /// hint. Returns the new next index.
    pub fn backtrack(&mut self, peer: &str, hint: u64, ledger: &Ledger) -> u64 {
        let next = self.next_for(peer);
        let prev = next.saturating_sub(1);
        let jump = ledger
            .term_at(prev.max(ledger.offset()))
            .ok()
            .and_then(|t| ledger.find_term_start(t))
            .map(|(_, idx)| idx)
            .unwrap_or_else(|| ledger.offset());
        let new_next = prev
            .min(hint + 1)
            .min(jump)
            .max(ledger.offset())
            .max(1);
        self.next_index.insert(peer.to_string(), new_next);
        tracing::debug!(peer, from = next, to = new_next, "Backtracking replication index");
        new_next
    }

    /// Advance the commit index to the highest entry replicated on a
    /// majority of the quorum. Entries from earlier terms are only
    /// committed transitively, never directly.
    pub fn advance_commit(&mut self, state: &mut NodeState) -> Option<u64> {
        let mut indices: Vec<u64> = state
            .members
            .peer_ids()
            .iter()
            .filter(|p| **p != state.node_id)
            .map(|p| self.match_index.get(p.as_str()).copied().unwrap_or(0))
            .collect();
        indices.push(state.ledger.last_index());
        indices.sort_unstable_by(|a, b| b.cmp(a));

        let majority = state.members.majority();
        if majority > indices.len() {
            return None;
        }
        let candidate = indices[majority - 1];
        if candidate <= state.commit_index {
            return None;
        }
        match state.ledger.term_at(candidate) {
            Ok(t) if t == state.term => {
                state.commit_index = candidate;
                tracing::debug!(commit_index = candidate, "Commit index advanced");
                Some(candidate)
            }
            _ => None,
        }
    }

    pub fn register_waiter(&mut self, index: u64, waiter: StoreWaiter) {
        self.pending.entry(index).or_default().push(waiter);
    }

    /// Waiters whose entries are now committed.
    pub fn take_committed(&mut self, commit_index: u64) -> Vec<(u64, StoreWaiter)> {
        let still_pending = self.pending.split_off(&(commit_index + 1));
        let committed = std::mem::replace(&mut self.pending, still_pending);
        committed
            .into_iter()
            .flat_map(|(index, waiters)| waiters.into_iter().map(move |w| (index, w)))
            .collect()
    }

    /// All remaining waiters, for rejection on step-down.
    pub fn drain_waiters(&mut self) -> Vec<StoreWaiter> {
        std::mem::take(&mut self.pending)
            .into_values()
            .flatten()
            .collect()
    }

    pub fn recall_request(&self, request_id: &Uuid) -> Option<u64> {
        self.recent_requests.get(request_id).copied()
    }

    pub fn note_request(&mut self, request_id: Uuid, index: u64) {
        self.recent_requests.insert(request_id, index);
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::ledger::{Command, LogEntry};

    fn state_with_members(peers: &[&str]) -> NodeState {
        let mut state = NodeState::new(&CoreConfig::new("a"));
        for peer in peers {
            state.members.observe(peer, true);
        }
        state
    }

    fn append_noops(state: &mut NodeState, terms: &[u64]) {
        for (i, term) in terms.iter().enumerate() {
            state
                .ledger
                .append(LogEntry::new(i as u64 + 1, *term, Command::Noop))
                .unwrap();
        }
    }

    #[test]
    fn commit_advances_on_majority_match() {
        let mut state = state_with_members(&["a", "b", "c"]);
        state.term = 1;
        append_noops(&mut state, &[1, 1, 1]);

        let mut leader = Leader::new(state.ledger.last_index(), ["b".to_string(), "c".to_string()]);
        assert_eq!(leader.advance_commit(&mut state), None);

        leader.record_success("b", 2);
        assert_eq!(leader.advance_commit(&mut state), Some(2));
        assert_eq!(state.commit_index, 2);

        leader.record_success("c", 3);
        assert_eq!(leader.advance_commit(&mut state), Some(3));
    }

    #[test]
    fn entries_from_older_terms_never_commit_directly() {
        let mut state = state_with_members(&["a", "b", "c"]);
        state.term = 2;
        append_noops(&mut state, &[1, 1]);

        let mut leader = Leader::new(state.ledger.last_index(), ["b".to_string(), "c".to_string()]);
        leader.record_success("b", 2);
        // Entry 2 is replicated on a majority but carries term 1.
        assert_eq!(leader.advance_commit(&mut state), None);
        assert_eq!(state.commit_index, 0);
    }

    #[test]
    fn backtrack_jumps_a_term_and_respects_the_hint() {
        let mut state = state_with_members(&["a", "b"]);
        state.term = 3;
        append_noops(&mut state, &[1, 1, 2, 2, 3]);

        let mut leader = Leader::new(state.ledger.last_index(), ["b".to_string()]);
        assert_eq!(leader.next_for("b"), 6);

        // Rejection probes back to the start of the previous term.
        let next = leader.backtrack("b", 5, &state.ledger);
        assert_eq!(next, 5);
        let next = leader.backtrack("b", 5, &state.ledger);
        assert_eq!(next, 3);

        // A short follower pulls next all the way down to its tail.
        let next = leader.backtrack("b", 0, &state.ledger);
        assert_eq!(next, 1);
    }

    #[test]
    fn waiters_resolve_in_commit_order() {
        let mut leader = Leader::new(0, Vec::new());
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        leader.register_waiter(1, StoreWaiter::Local(tx1));
        leader.register_waiter(2, StoreWaiter::Local(tx2));

        for (index, waiter) in leader.take_committed(1) {
            waiter.resolve_committed(index);
        }
        assert_eq!(rx1.try_recv().unwrap().unwrap(), 1);
        assert!(rx2.try_recv().is_err());

        for (index, waiter) in leader.take_committed(2) {
            waiter.resolve_committed(index);
        }
        assert_eq!(rx2.try_recv().unwrap().unwrap(), 2);
    }

    #[test]
    fn replayed_request_resolves_to_original_index() {
        let mut leader = Leader::new(0, Vec::new());
        let id = Uuid::new_v4();
        assert_eq!(leader.recall_request(&id), None);
        leader.note_request(id, 4);
        assert_eq!(leader.recall_request(&id), Some(4));
    }
}
