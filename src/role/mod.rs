//! The four-state role machine: Learner, Follower, Candidate, Leader.
//!
//! Exactly one role is live per core at any instant. Transitions are
//! exclusive: the outgoing role's `stop()` cancels every timer and
//! in-flight call it owns before the incoming role's `start()` runs, so a
//! stale candidate's election timer can never fire after promotion.

pub mod candidate;
pub mod follower;
pub mod leader;
pub mod learner;

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use candidate::Candidate;
pub use follower::Follower;
pub use leader::{Leader, StoreWaiter};
pub use learner::Learner;

use crate::rpc::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::state::NodeState;

/// Election timeout window in multiples of the heartbeat base.
pub(crate) const ELECTION_WINDOW: (u64, u64) = (3, 6);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Learner,
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleKind::Learner => write!(f, "learner"),
            RoleKind::Follower => write!(f, "follower"),
            RoleKind::Candidate => write!(f, "candidate"),
            RoleKind::Leader => write!(f, "leader"),
        }
    }
}

/// Role swap requested by an RPC handler; the state mutation itself has
/// already happened by the time one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ToFollower,
    ToCandidate,
    ToLeader,
}

/// Ticks emitted by role-owned timers back into the core event loop.
#[derive(Debug, Clone, Copy)]
pub enum RoleEvent {
    /// A randomized election window elapsed.
    ElectionTimeout { window: Duration },
    /// Leader replication cadence.
    ReplicateTick,
}

/// What a role needs to start its timers.
pub struct RoleCtx {
    pub events: mpsc::UnboundedSender<RoleEvent>,
    pub heartbeat_base: Duration,
}

/// Tagged union over the four concrete role implementations.
pub enum Role {
    Learner(Learner),
    Follower(Follower),
    Candidate(Candidate),
    Leader(Leader),
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Learner(_) => RoleKind::Learner,
            Role::Follower(_) => RoleKind::Follower,
            Role::Candidate(_) => RoleKind::Candidate,
            Role::Leader(_) => RoleKind::Leader,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        match self {
            Role::Learner(r) => r.token(),
            Role::Follower(r) => r.token(),
            Role::Candidate(r) => r.token(),
            Role::Leader(r) => r.token(),
        }
    }

    pub fn start(&mut self, ctx: &RoleCtx) {
        match self {
            Role::Learner(r) => r.start(ctx),
            Role::Follower(r) => r.start(ctx),
            Role::Candidate(r) => r.start(ctx),
            Role::Leader(r) => r.start(ctx),
        }
    }

    /// Cancel every timer and in-flight task this role owns.
    pub fn stop(&self) {
        self.token().cancel();
    }

    pub fn handle_append_entries(
        &mut self,
        state: &mut NodeState,
        req: &AppendEntriesRequest,
    ) -> (AppendEntriesResponse, Option<Transition>) {
        let stale = req.term < state.term;
        match self {
            Role::Follower(_) => (follower::append_entries(state, req), None),
            Role::Learner(_) if !stale => {
                // A live leader exists: no reason to stay out of the
                // electorate.
                (follower::append_entries(state, req), Some(Transition::ToFollower))
            }
            Role::Candidate(_) if !stale => {
                // Valid heartbeat from a leader elected this term or later.
                (follower::append_entries(state, req), Some(Transition::ToFollower))
            }
            Role::Leader(_) if req.term > state.term => {
                (follower::append_entries(state, req), Some(Transition::ToFollower))
            }
            _ => {
                if self.kind() == RoleKind::Leader && req.term == state.term {
                    tracing::error!(
                        node_id = %state.node_id,
                        term = state.term,
                        other = %req.leader_id,
                        "AppendEntries from another leader in the same term"
                    );
                }
                (
                    AppendEntriesResponse {
                        term: state.term,
                        success: false,
                        match_index: state.ledger.last_index(),
                    },
                    None,
                )
            }
        }
    }

    pub fn handle_request_vote(
        &mut self,
        state: &mut NodeState,
        req: &VoteRequest,
    ) -> (VoteResponse, Option<Transition>) {
        match self {
            Role::Learner(_) => {
                // Learners track terms but sit out elections.
                state.observe_term(req.term);
                (
                    VoteResponse {
                        term: state.term,
                        granted: false,
                    },
                    None,
                )
            }
            Role::Follower(_) => (follower::request_vote(state, req), None),
            Role::Candidate(_) | Role::Leader(_) => {
                if req.term > state.term {
                    (follower::request_vote(state, req), Some(Transition::ToFollower))
                } else {
                    (
                        VoteResponse {
                            term: state.term,
                            granted: false,
                        },
                        None,
                    )
                }
            }
        }
    }
}
