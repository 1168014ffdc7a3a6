use tokio_util::sync::CancellationToken;

use crate::rpc::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::state::NodeState;
use crate::timer::{random_window, RandomizedTimer};

use super::{RoleCtx, RoleEvent, ELECTION_WINDOW};

/// Handle an AppendEntries RPC against the local state.
///
/// Safe under reordering and replay: entries already in place are skipped,
/// so only a genuine conflict truncates, and a stale duplicate of an older
/// append can never roll back newer entries.
pub fn append_entries(state: &mut NodeState, req: &AppendEntriesRequest) -> AppendEntriesResponse {
    if req.term < state.term {
        return AppendEntriesResponse {
            term: state.term,
            success: false,
            match_index: state.ledger.last_index(),
        };
    }

    state.observe_term(req.term);
    state.leader_id = Some(req.leader_id.clone());
    state.touch_heartbeat();

    if !state.ledger.matches(req.prev_log_index, req.prev_log_term) {
        tracing::debug!(
            node_id = %state.node_id,
            prev_log_index = req.prev_log_index,
            prev_log_term = req.prev_log_term,
            last_index = state.ledger.last_index(),
            "AppendEntries prev mismatch, leader must backtrack"
        );
        return AppendEntriesResponse {
            term: state.term,
            success: false,
            match_index: state.ledger.last_index(),
        };
    }

    let mut entries = req.entries.as_slice();
    while let Some(first) = entries.first() {
        if state.ledger.matches(first.index, first.term) {
            entries = &entries[1..];
        } else {
            break;
        }
    }
    if let Some(first) = entries.first() {
        if let Err(e) = state.ledger.replace(first.index, entries.to_vec()) {
            tracing::warn!(
                node_id = %state.node_id,
                start_index = first.index,
                error = %e,
                "Rejecting AppendEntries, suffix cannot be rewritten"
            );
            return AppendEntriesResponse {
                term: state.term,
                success: false,
                match_index: state.ledger.last_index(),
            };
        }
        tracing::debug!(
            node_id = %state.node_id,
            appended = entries.len(),
            last_index = state.ledger.last_index(),
            "Appended replicated entries"
        );
    }

    if req.leader_commit > state.commit_index {
        state.commit_index = req.leader_commit.min(state.ledger.last_index());
    }

    AppendEntriesResponse {
        term: state.term,
        success: true,
        match_index: state.ledger.last_index(),
    }
}

/// Handle a RequestVote RPC against the local state.
pub fn request_vote(state: &mut NodeState, req: &VoteRequest) -> VoteResponse {
    if req.term < state.term {
        return VoteResponse {
            term: state.term,
            granted: false,
        };
    }

    state.observe_term(req.term);
    let granted = state.can_vote_for(&req.candidate_id)
        && state.log_up_to_date(req.last_log_index, req.last_log_term);
    if granted {
        state.record_vote(&req.candidate_id);
        state.touch_heartbeat();
    }

    tracing::debug!(
        node_id = %state.node_id,
        candidate = %req.candidate_id,
        term = req.term,
        granted,
        "RequestVote handled"
    );

    VoteResponse {
        term: state.term,
        granted,
    }
}

/// Passive replica: applies the leader's appends and votes in elections.
/// Its election timer promotes it to candidate when the leader goes
/// silent for a full randomized window.
pub struct Follower {
    token: CancellationToken,
    timers: Vec<RandomizedTimer>,
}

impl Default for Follower {
    fn default() -> Self {
        Self::new()
    }
}

impl Follower {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            timers: Vec::new(),
        }
    }

    pub fn start(&mut self, ctx: &RoleCtx) {
        let events = ctx.events.clone();
        let base = ctx.heartbeat_base;
        self.timers.push(RandomizedTimer::spawn_scoped(
            self.token.clone(),
            move || random_window(base, ELECTION_WINDOW.0, ELECTION_WINDOW.1),
            move |window| {
                let _ = events.send(RoleEvent::ElectionTimeout { window });
            },
            false,
        ));
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
