use tokio::time::Instant;

use crate::config::CoreConfig;
use crate::ledger::Ledger;
use crate::membership::{CohortPredicate, MembershipTracker};

/// Bookkeeping shared by every role: term and vote state, the ledger, the
/// membership view, and the heartbeat clock the election timers compare
/// against.
pub struct NodeState {
    pub node_id: String,
    pub term: u64,
    pub voted_for: Option<String>,
    pub leader_id: Option<String>,
    pub commit_index: u64,
    pub last_heartbeat: Instant,
    pub ledger: Ledger,
    pub members: MembershipTracker,
}

impl NodeState {
    pub fn new(config: &CoreConfig) -> Self {
        let members = MembershipTracker::new(&config.node_id, config.grace_cycles);
        Self::with_members(config, members)
    }

    pub fn with_cohort(config: &CoreConfig, cohort: CohortPredicate) -> Self {
        let members = MembershipTracker::with_cohort(config.grace_cycles, cohort);
        Self::with_members(config, members)
    }

    fn with_members(config: &CoreConfig, members: MembershipTracker) -> Self {
        Self {
            node_id: config.node_id.clone(),
            term: 0,
            voted_for: None,
            leader_id: None,
            commit_index: 0,
            last_heartbeat: Instant::now(),
            ledger: Ledger::new(config.ledger_capacity),
            members,
        }
    }

    /// Adopt `term` if it is newer, clearing the vote cast in the old
    /// term. Returns true when the term advanced.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term > self.term {
            self.term = term;
            self.voted_for = None;
            self.leader_id = None;
            return true;
        }
        false
    }

    /// Whether a candidate's `(last_log_term, last_log_index)` is at least
    /// as up-to-date as the local tail, compared term-first.
    pub fn log_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        let own_term = self.ledger.last_term();
        let own_index = self.ledger.last_index();
        last_log_term > own_term || (last_log_term == own_term && last_log_index >= own_index)
    }

    /// Whether a vote can be granted to `candidate` this term.
    pub fn can_vote_for(&self, candidate: &str) -> bool {
        match &self.voted_for {
            None => true,
            Some(voted) => voted == candidate,
        }
    }

    pub fn record_vote(&mut self, candidate: &str) {
        self.voted_for = Some(candidate.to_string());
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Command, LogEntry};

    fn state() -> NodeState {
        NodeState::new(&CoreConfig::new("a"))
    }

    #[test]
    fn observe_term_advances_and_clears_vote() {
        let mut s = state();
        s.record_vote("b");
        s.leader_id = Some("b".to_string());

        assert!(s.observe_term(3));
        assert_eq!(s.term, 3);
        assert_eq!(s.voted_for, None);
        assert_eq!(s.leader_id, None);

        // Same or older terms change nothing.
        s.record_vote("c");
        assert!(!s.observe_term(3));
        assert!(!s.observe_term(1));
        assert_eq!(s.voted_for, Some("c".to_string()));
    }

    #[test]
    fn log_up_to_date_compares_term_then_index() {
        let mut s = state();
        s.ledger
            .append(LogEntry::new(1, 1, Command::Noop))
            .unwrap();
        s.ledger
            .append(LogEntry::new(2, 2, Command::Noop))
            .unwrap();

        // Higher term always wins.
        assert!(s.log_up_to_date(1, 3));
        // Equal term needs an index at least as high.
        assert!(s.log_up_to_date(2, 2));
        assert!(s.log_up_to_date(5, 2));
        assert!(!s.log_up_to_date(1, 2));
        // Lower term never wins, whatever the index.
        assert!(!s.log_up_to_date(100, 1));
    }

    #[test]
    fn single_vote_per_term() {
        let mut s = state();
        assert!(s.can_vote_for("b"));
        s.record_vote("b");
        assert!(s.can_vote_for("b"));
        assert!(!s.can_vote_for("c"));
    }
}
