use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::timer::{random_window, RandomizedTimer};

use super::{RoleCtx, RoleEvent, ELECTION_WINDOW};

/// A node running an election: it has voted for itself and is collecting
/// grants from the quorum observed at candidacy start. The election timer
/// restarts the election with a freshly randomized window if no majority
/// arrives in time, which breaks split-vote collisions.
pub struct Candidate {
    token: CancellationToken,
    timers: Vec<RandomizedTimer>,
    election_term: u64,
    quorum_at_start: usize,
    votes: HashSet<String>,
}

impl Candidate {
    pub fn new(election_term: u64, quorum_at_start: usize, self_id: &str) -> Self {
        let mut votes = HashSet::new();
        votes.insert(self_id.to_string());
        Self {
            token: CancellationToken::new(),
            timers: Vec::new(),
            election_term,
            quorum_at_start,
            votes,
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

    /// Record a grant. Returns true once a majority of the quorum
    /// snapshot has granted.
    pub fn record_grant(&mut self, peer: &str) -> bool {
        self.votes.insert(peer.to_string());
        self.has_majority()
    }

    pub fn has_majority(&self) -> bool {
        self.votes.len() >= self.quorum_at_start / 2 + 1
    }

    pub fn election_term(&self) -> u64 {
        self.election_term
    }

    pub fn votes(&self) -> usize {
        self.votes.len()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_over_five_node_quorum() {
        let mut candidate = Candidate::new(2, 5, "a");
        assert_eq!(candidate.votes(), 1);
        assert!(!candidate.has_majority());

        assert!(!candidate.record_grant("b"));
        assert!(candidate.record_grant("c"));
        assert_eq!(candidate.votes(), 3);
    }

    #[test]
    fn duplicate_grants_count_once() {
        let mut candidate = Candidate::new(2, 5, "a");
        assert!(!candidate.record_grant("b"));
        assert!(!candidate.record_grant("b"));
        assert_eq!(candidate.votes(), 2);
    }

    #[test]
    fn two_grants_of_five_is_not_enough() {
        let mut candidate = Candidate::new(7, 5, "a");
        candidate.record_grant("b");
        assert!(!candidate.has_majority());
    }

    #[test]
    fn single_node_quorum_wins_immediately() {
        let candidate = Candidate::new(1, 1, "a");
        assert!(candidate.has_majority());
    }
}
