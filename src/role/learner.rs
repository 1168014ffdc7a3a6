use tokio_util::sync::CancellationToken;

use super::{RoleCtx, Transition};

/// Initial role: accumulates a gossip view of the cluster before joining
/// the electorate. Promotes to follower after a configured number of
/// announce cycles, or as soon as an elected leader makes itself known
/// through a valid AppendEntries.
pub struct Learner {
    token: CancellationToken,
    announce_ticks: u32,
    bootstrap_cycles: u32,
}

impl Learner {
    pub fn new(bootstrap_cycles: u32) -> Self {
        Self {
            token: CancellationToken::new(),
            announce_ticks: 0,
            bootstrap_cycles,
        }
    }

    // Learners own no timers; the core's announce timer drives bootstrap.
    pub fn start(&mut self, _ctx: &RoleCtx) {}

    pub fn on_announce_tick(&mut self) -> Option<Transition> {
        self.announce_ticks += 1;
        (self.announce_ticks >= self.bootstrap_cycles).then_some(Transition::ToFollower)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_after_bootstrap_cycles() {
        let mut learner = Learner::new(2);
        assert_eq!(learner.on_announce_tick(), None);
        assert_eq!(learner.on_announce_tick(), Some(Transition::ToFollower));
    }

    #[test]
    fn zero_cycles_promotes_on_first_tick() {
        let mut learner = Learner::new(0);
        assert_eq!(learner.on_announce_tick(), Some(Transition::ToFollower));
    }
}
