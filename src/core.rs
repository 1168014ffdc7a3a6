//! Core coordinator.
//!
//! Owns the ledger, the membership tracker, the gossip timers and the
//! active role; demultiplexes inbound envelopes to the role's handlers;
//! fans out votes and replication through the transport; and rebalances
//! the external job queue's duty share on leadership changes.
//!
//! The core is an actor: a single event loop consumes `CoreEvent`s, so at
//! most one handler mutates state at a time. Awaited work (outbound
//! calls) runs in spawned tasks scoped to the issuing role's cancellation
//! token, and its results re-enter the loop as events stamped with the
//! term they were issued under, which the loop re-validates before acting.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::dispatch::QueueDispatcher;
use crate::error::{ConsensusError, Result};
use crate::ledger::{Command, LogEntry};
use crate::membership::{CohortPredicate, GossipMessage};
use crate::role::{
    Candidate, Follower, Leader, Learner, Role, RoleCtx, RoleEvent, RoleKind, StoreWaiter,
    Transition,
};
use crate::rpc::{
    self, AppendEntriesRequest, AppendEntriesResponse, Envelope, Request, Response, StoreRequest,
    VoteRequest, VoteResponse,
};
use crate::state::NodeState;
use crate::telemetry::{self, TraceContext};
use crate::timer::{random_window, RandomizedTimer};
use crate::transport::{Inbound, Transport};

/// Gossip announce window in multiples of the heartbeat base.
const ANNOUNCE_WINDOW: (u64, u64) = (4, 5);
/// Liveness sweep window, staggered past the announce window so a sweep
/// cycle typically observes at least one announce.
const SWEEP_WINDOW: (u64, u64) = (5, 6);

/// Application task run only while this node is leader. Receives a token
/// cancelled on step-down.
pub type LeaderDuty =
    Arc<dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Point-in-time view of a node's consensus state.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub role: RoleKind,
    pub term: u64,
    pub leader_id: Option<String>,
    pub commit_index: u64,
    pub last_log_index: u64,
    pub quorum_size: usize,
}

pub(crate) enum CoreEvent {
    Rpc {
        raw: serde_json::Value,
        reply: oneshot::Sender<Result<Response>>,
    },
    Store {
        request: StoreRequest,
        reply: oneshot::Sender<Result<u64>>,
    },
    Register {
        duty: LeaderDuty,
    },
    Status {
        reply: oneshot::Sender<NodeStatus>,
    },
    Tail {
        n: usize,
        reply: oneshot::Sender<Vec<LogEntry>>,
    },
    AnnounceTick,
    SweepTick,
    VoteReply {
        election_term: u64,
        peer: String,
        resp: VoteResponse,
    },
    AppendReply {
        term: u64,
        peer: String,
        resp: AppendEntriesResponse,
    },
    Shutdown,
}

/// The consensus coordinator. Construct with [`Core::new`], wire the
/// returned [`CoreHandle`] into the broker subscription, then drive
/// [`Core::run`] on its own task.
pub struct Core {
    config: CoreConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn QueueDispatcher>,
    state: NodeState,
    role: Role,
    duties: Vec<LeaderDuty>,
    events_tx: mpsc::UnboundedSender<CoreEvent>,
    events_rx: mpsc::UnboundedReceiver<CoreEvent>,
    role_tx: mpsc::UnboundedSender<RoleEvent>,
    role_rx: mpsc::UnboundedReceiver<RoleEvent>,
    gossip_timers: Vec<RandomizedTimer>,
}

impl Core {
    pub fn new(
        config: CoreConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn QueueDispatcher>,
    ) -> (Self, CoreHandle) {
        let state = NodeState::new(&config);
        Self::with_state(config, transport, dispatcher, state)
    }

    /// Like [`Core::new`] with an injected cohort predicate for duty
    /// rebalancing.
    pub fn with_cohort(
        config: CoreConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn QueueDispatcher>,
        cohort: CohortPredicate,
    ) -> (Self, CoreHandle) {
        let state = NodeState::with_cohort(&config, cohort);
        Self::with_state(config, transport, dispatcher, state)
    }

    fn with_state(
        config: CoreConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn QueueDispatcher>,
        state: NodeState,
    ) -> (Self, CoreHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (role_tx, role_rx) = mpsc::unbounded_channel();
        let role = Role::Learner(Learner::new(config.bootstrap_cycles));
        let core = Self {
            config,
            transport,
            dispatcher,
            state,
            role,
            duties: Vec::new(),
            events_tx: events_tx.clone(),
            events_rx,
            role_tx,
            role_rx,
            gossip_timers: Vec::new(),
        };
        (core, CoreHandle { events: events_tx })
    }

    /// Run the event loop until [`CoreHandle::shutdown`] is called.
    pub async fn run(mut self) {
        tracing::info!(
            node_id = %self.config.node_id,
            group = %self.config.group,
            "Consensus core starting as learner"
        );
        self.start_gossip_timers();
        let ctx = self.role_ctx();
        self.role.start(&ctx);

        loop {
            tokio::select! {
                ev = self.events_rx.recv() => match ev {
                    Some(CoreEvent::Shutdown) | None => break,
                    Some(ev) => self.on_event(ev),
                },
                Some(rev) = self.role_rx.recv() => self.on_role_event(rev),
            }
        }

        self.role.stop();
        let leave = Envelope::with_trace(
            Request::Broadcast(GossipMessage {
                peer_id: self.config.node_id.clone(),
                joining: false,
            }),
            TraceContext::root(),
        );
        let _ = self
            .transport
            .send(&rpc::broadcast(&self.config.group), leave)
            .await;
        tracing::info!(node_id = %self.config.node_id, "Consensus core stopped");
    }

    fn start_gossip_timers(&mut self) {
        let base = self.config.heartbeat_base();
        let tx = self.events_tx.clone();
        self.gossip_timers.push(RandomizedTimer::spawn(
            move || random_window(base, ANNOUNCE_WINDOW.0, ANNOUNCE_WINDOW.1),
            move |_| {
                let _ = tx.send(CoreEvent::AnnounceTick);
            },
            true,
        ));
        let tx = self.events_tx.clone();
        self.gossip_timers.push(RandomizedTimer::spawn(
            move || random_window(base, SWEEP_WINDOW.0, SWEEP_WINDOW.1),
            move |_| {
                let _ = tx.send(CoreEvent::SweepTick);
            },
            false,
        ));
    }

    fn role_ctx(&self) -> RoleCtx {
        RoleCtx {
            events: self.role_tx.clone(),
            heartbeat_base: self.config.heartbeat_base(),
        }
    }

    fn on_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Rpc { raw, reply } => self.on_rpc(raw, reply),
            CoreEvent::Store { request, reply } => {
                self.handle_store(request, StoreWaiter::Local(reply))
            }
            CoreEvent::Register { duty } => {
                if let Role::Leader(leader) = &self.role {
                    Self::spawn_duty(&duty, leader.token());
                }
                self.duties.push(duty);
            }
            CoreEvent::Status { reply } => {
                let _ = reply.send(self.status());
            }
            CoreEvent::Tail { n, reply } => {
                let tail = self.state.ledger.recent(n).into_iter().cloned().collect();
                let _ = reply.send(tail);
            }
            CoreEvent::AnnounceTick => self.on_announce_tick(),
            CoreEvent::SweepTick => {
                self.state.members.sweep();
            }
            CoreEvent::VoteReply {
                election_term,
                peer,
                resp,
            } => self.on_vote_reply(election_term, &peer, resp),
            CoreEvent::AppendReply { term, peer, resp } => self.on_append_reply(term, &peer, resp),
            CoreEvent::Shutdown => unreachable!("handled in run loop"),
        }
    }

    /// Demultiplex one inbound envelope to the active role.
    fn on_rpc(&mut self, raw: serde_json::Value, reply: oneshot::Sender<Result<Response>>) {
        let envelope: Envelope = match serde_json::from_value(raw) {
            Ok(env) => env,
            Err(e) => {
                tracing::error!(
                    node_id = %self.config.node_id,
                    error = %e,
                    "Dropping envelope with unrecognized mode"
                );
                let _ = reply.send(Err(ConsensusError::ProtocolViolation(format!(
                    "unrecognized envelope: {e}"
                ))));
                return;
            }
        };

        let trace = envelope.trace.clone().unwrap_or_default();
        let span = telemetry::root_span(envelope.mode(), &trace);
        let _guard = span.enter();

        match envelope.body {
            Request::Broadcast(gossip) => {
                // Gossip bypasses the role machine entirely.
                self.state.members.observe(&gossip.peer_id, gossip.joining);
                let _ = reply.send(Ok(Response::Ack));
            }
            Request::AppendEntries(req) => {
                let (resp, transition) = self.role.handle_append_entries(&mut self.state, &req);
                let _ = reply.send(Ok(Response::AppendEntries(resp)));
                if let Some(t) = transition {
                    self.apply_transition(t);
                }
            }
            Request::RequestVote(req) => {
                let (resp, transition) = self.role.handle_request_vote(&mut self.state, &req);
                let _ = reply.send(Ok(Response::RequestVote(resp)));
                if let Some(t) = transition {
                    self.apply_transition(t);
                }
            }
            Request::RequestStore(req) => self.handle_store(req, StoreWaiter::Remote(reply)),
        }
    }

    /// Leader-only: append, replicate, resolve the waiter once a majority
    /// acknowledges. Anyone else rejects immediately with the best-known
    /// leader hint.
    fn handle_store(&mut self, request: StoreRequest, waiter: StoreWaiter) {
        let leader_hint = self.state.leader_id.clone();
        let term = self.state.term;
        match &mut self.role {
            Role::Leader(leader) => {
                if let Some(index) = leader.recall_request(&request.request_id) {
                    tracing::debug!(index, request_id = %request.request_id, "Replayed store request");
                    if index <= self.state.commit_index {
                        waiter.resolve_committed(index);
                    } else {
                        leader.register_waiter(index, waiter);
                    }
                    return;
                }
                let index = self.state.ledger.last_index() + 1;
                match self
                    .state
                    .ledger
                    .append(LogEntry::new(index, term, request.command))
                {
                    Ok(()) => {
                        leader.note_request(request.request_id, index);
                        leader.register_waiter(index, waiter);
                        tracing::debug!(index, term, "Command appended, replicating");
                    }
                    Err(e) => {
                        waiter.resolve_error(e);
                        return;
                    }
                }
            }
            _ => {
                tracing::debug!(
                    node_id = %self.state.node_id,
                    leader = ?leader_hint,
                    "RequestStore rejected, not leader"
                );
                waiter.resolve_not_leader(leader_hint);
                return;
            }
        }
        self.leader_commit_cycle();
        self.replicate_all();
    }

    fn on_role_event(&mut self, event: RoleEvent) {
        match event {
            RoleEvent::ElectionTimeout { window } => match &self.role {
                Role::Follower(_) => {
                    let silent_for = self.state.last_heartbeat.elapsed();
                    if silent_for >= window {
                        tracing::info!(
                            node_id = %self.state.node_id,
                            term = self.state.term,
                            silent_ms = silent_for.as_millis() as u64,
                            "Election timeout, standing as candidate"
                        );
                        self.to_candidate();
                    }
                }
                Role::Candidate(_) => {
                    tracing::info!(
                        node_id = %self.state.node_id,
                        term = self.state.term,
                        "Election inconclusive, restarting with a fresh timeout"
                    );
                    self.to_candidate();
                }
                _ => {}
            },
            RoleEvent::ReplicateTick => {
                if matches!(self.role, Role::Leader(_)) {
                    self.replicate_all();
                }
            }
        }
    }

    fn on_announce_tick(&mut self) {
        self.state.members.observe(&self.state.node_id, true);

        if let Role::Learner(learner) = &mut self.role {
            if let Some(t) = learner.on_announce_tick() {
                tracing::info!(
                    node_id = %self.state.node_id,
                    quorum = self.state.members.quorum_size(),
                    "Gossip view settled, joining electorate"
                );
                self.apply_transition(t);
            }
        }

        let env = Envelope::with_trace(
            Request::Broadcast(GossipMessage {
                peer_id: self.state.node_id.clone(),
                joining: true,
            }),
            TraceContext::root(),
        );
        let dst = rpc::broadcast(&self.config.group);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send(&dst, env).await {
                tracing::debug!(error = %e, "Gossip announce failed");
            }
        });
    }

    fn on_vote_reply(&mut self, election_term: u64, peer: &str, resp: VoteResponse) {
        if resp.term > self.state.term {
            self.state.observe_term(resp.term);
            self.to_follower();
            return;
        }
        // A reply from a superseded election is peer noise.
        if election_term != self.state.term {
            return;
        }
        let won = match &mut self.role {
            Role::Candidate(candidate) if resp.granted => {
                let won = candidate.record_grant(peer);
                tracing::debug!(
                    node_id = %self.state.node_id,
                    peer,
                    votes = candidate.votes(),
                    "Vote granted"
                );
                won
            }
            _ => false,
        };
        if won {
            self.to_leader();
        }
    }

    fn on_append_reply(&mut self, term: u64, peer: &str, resp: AppendEntriesResponse) {
        if resp.term > self.state.term {
            self.state.observe_term(resp.term);
            self.to_follower();
            return;
        }
        if term != self.state.term {
            return;
        }
        let Role::Leader(leader) = &mut self.role else {
            return;
        };
        if resp.success {
            leader.record_success(peer, resp.match_index);
        } else {
            leader.backtrack(peer, resp.match_index, &self.state.ledger);
            return;
        }
        self.leader_commit_cycle();
    }

    fn leader_commit_cycle(&mut self) {
        let advanced = {
            let Role::Leader(leader) = &mut self.role else {
                return;
            };
            leader.advance_commit(&mut self.state)
        };
        if advanced.is_some() {
            let commit_index = self.state.commit_index;
            let Role::Leader(leader) = &mut self.role else {
                return;
            };
            for (index, waiter) in leader.take_committed(commit_index) {
                waiter.resolve_committed(index);
            }
        }
    }

    /// Send AppendEntries to every known peer from its next index.
    fn replicate_all(&mut self) {
        let last_index = self.state.ledger.last_index();
        let peers: Vec<String> = self
            .state
            .members
            .peer_ids()
            .into_iter()
            .filter(|p| *p != self.state.node_id)
            .collect();

        let mut batches = Vec::with_capacity(peers.len());
        {
            let Role::Leader(leader) = &mut self.role else {
                return;
            };
            for peer in peers {
                leader.ensure_peer(&peer, last_index);
                let next = leader.next_for(&peer);
                let prev = next.saturating_sub(1);
                let prev_term = self.state.ledger.term_at(prev).unwrap_or(0);
                let req = AppendEntriesRequest {
                    term: self.state.term,
                    leader_id: self.state.node_id.clone(),
                    prev_log_index: prev,
                    prev_log_term: prev_term,
                    entries: self.state.ledger.entries_from(next),
                    leader_commit: self.state.commit_index,
                };
                batches.push((peer, req, leader.token().child_token()));
            }
        }
        for (peer, req, token) in batches {
            self.spawn_append(peer, req, token);
        }
    }

    fn spawn_append(&self, peer: String, req: AppendEntriesRequest, token: CancellationToken) {
        let dst = rpc::direct(&self.config.group, &peer);
        let env = Envelope::with_trace(Request::AppendEntries(req), TraceContext::root());
        let transport = self.transport.clone();
        let events = self.events_tx.clone();
        let timeout = self.config.rpc_timeout();
        let term = self.state.term;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = transport.call(&dst, env, timeout) => match result {
                    Ok(Response::AppendEntries(resp)) => {
                        let _ = events.send(CoreEvent::AppendReply { term, peer, resp });
                    }
                    Ok(_) => {
                        tracing::warn!(peer = %peer, "Mismatched response mode to AppendEntries");
                    }
                    Err(e) => {
                        // Peer silence; the next tick retries.
                        tracing::trace!(peer = %peer, error = %e, "AppendEntries call failed");
                    }
                }
            }
        });
    }

    fn request_votes(&mut self) {
        let term = self.state.term;
        let req = VoteRequest {
            term,
            candidate_id: self.state.node_id.clone(),
            last_log_index: self.state.ledger.last_index(),
            last_log_term: self.state.ledger.last_term(),
        };
        let peers: Vec<String> = self
            .state
            .members
            .peer_ids()
            .into_iter()
            .filter(|p| *p != self.state.node_id)
            .collect();
        let Role::Candidate(candidate) = &self.role else {
            return;
        };
        for peer in peers {
            let dst = rpc::direct(&self.config.group, &peer);
            let env = Envelope::with_trace(Request::RequestVote(req.clone()), TraceContext::root());
            let transport = self.transport.clone();
            let events = self.events_tx.clone();
            let timeout = self.config.rpc_timeout();
            let token = candidate.token().child_token();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    result = transport.call(&dst, env, timeout) => match result {
                        Ok(Response::RequestVote(resp)) => {
                            let _ = events.send(CoreEvent::VoteReply {
                                election_term: term,
                                peer,
                                resp,
                            });
                        }
                        Ok(_) => {
                            tracing::warn!(peer = %peer, "Mismatched response mode to RequestVote");
                        }
                        Err(e) => {
                            tracing::debug!(peer = %peer, error = %e, "Vote request failed");
                        }
                    }
                }
            });
        }
    }

    fn apply_transition(&mut self, transition: Transition) {
        match transition {
            Transition::ToFollower => self.to_follower(),
            Transition::ToCandidate => self.to_candidate(),
            Transition::ToLeader => self.to_leader(),
        }
    }

    /// Stop the outgoing role, swap, start the incoming one. Stepping
    /// down from leadership rejects pending stores and restores the full
    /// queue duty share.
    fn swap_role(&mut self, next: Role) {
        let from = self.role.kind();
        self.role.stop();
        if let Role::Leader(leader) = &mut self.role {
            let hint = self.state.leader_id.clone();
            for waiter in leader.drain_waiters() {
                waiter.resolve_not_leader(hint.clone());
            }
            self.dispatcher.rebalance(1.0);
            tracing::info!(node_id = %self.state.node_id, "Stepped down, full queue duty restored");
        }
        self.role = next;
        let ctx = self.role_ctx();
        self.role.start(&ctx);
        tracing::info!(
            node_id = %self.state.node_id,
            from = %from,
            to = %self.role.kind(),
            term = self.state.term,
            "Role transition"
        );
    }

    fn to_follower(&mut self) {
        // Grant the cluster a full window before standing again.
        self.state.touch_heartbeat();
        self.swap_role(Role::Follower(Follower::new()));
    }

    fn to_candidate(&mut self) {
        self.state.term += 1;
        self.state.voted_for = Some(self.state.node_id.clone());
        self.state.leader_id = None;
        let quorum = self.state.members.quorum_size().max(1);
        let candidate = Candidate::new(self.state.term, quorum, &self.state.node_id);
        let already_won = candidate.has_majority();
        tracing::info!(
            node_id = %self.state.node_id,
            term = self.state.term,
            quorum,
            "Starting election"
        );
        self.swap_role(Role::Candidate(candidate));
        if already_won {
            // Single-node quorum: the self-vote is the majority.
            self.to_leader();
            return;
        }
        self.request_votes();
    }

    fn to_leader(&mut self) {
        self.state.leader_id = Some(self.state.node_id.clone());
        let last_index = self.state.ledger.last_index();
        let peers = self
            .state
            .members
            .peer_ids()
            .into_iter()
            .filter(|p| *p != self.state.node_id);
        let leader = Leader::new(last_index, peers);
        tracing::info!(
            node_id = %self.state.node_id,
            term = self.state.term,
            cohort = self.state.members.cohort().len(),
            "Won election, assuming leadership"
        );
        self.swap_role(Role::Leader(leader));

        // Reserve consensus capacity on the shared work queue.
        self.dispatcher.rebalance(self.config.leader_duty_ratio);

        // Taking office commits prior-term entries transitively.
        let noop = LogEntry::new(last_index + 1, self.state.term, Command::Noop);
        if let Err(e) = self.state.ledger.append(noop) {
            tracing::error!(error = %e, "Failed to append take-office entry");
        }

        if let Role::Leader(leader) = &self.role {
            for duty in &self.duties {
                Self::spawn_duty(duty, leader.token());
            }
        }
        self.leader_commit_cycle();
    }

    fn spawn_duty(duty: &LeaderDuty, token: &CancellationToken) {
        let child = token.child_token();
        let fut = duty(child.clone());
        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.state.node_id.clone(),
            role: self.role.kind(),
            term: self.state.term,
            leader_id: self.state.leader_id.clone(),
            commit_index: self.state.commit_index,
            last_log_index: self.state.ledger.last_index(),
            quorum_size: self.state.members.quorum_size(),
        }
    }
}

/// Cheap, clonable handle onto a running [`Core`].
#[derive(Clone)]
pub struct CoreHandle {
    events: mpsc::UnboundedSender<CoreEvent>,
}

impl CoreHandle {
    /// Deliver an inbound envelope and wait for the role's response. This
    /// is the entry point a broker subscription drives.
    pub async fn deliver(&self, envelope: Envelope) -> Result<Response> {
        let raw = serde_json::to_value(&envelope)
            .map_err(|e| ConsensusError::ProtocolViolation(e.to_string()))?;
        self.deliver_raw(raw).await
    }

    /// [`CoreHandle::deliver`] for payloads still in wire shape.
    pub async fn deliver_raw(&self, raw: serde_json::Value) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(CoreEvent::Rpc { raw, reply: tx })
            .map_err(|_| ConsensusError::ChannelClosed)?;
        rx.await.map_err(|_| ConsensusError::ChannelClosed)?
    }

    /// Submit a command for replication. Resolves with the committed
    /// index, or an explicit error; never hangs past `deadline`.
    pub async fn store(&self, command: Command, deadline: Duration) -> Result<u64> {
        self.store_request(StoreRequest::new(command), deadline).await
    }

    /// [`CoreHandle::store`] with a caller-supplied request id, so
    /// retries are idempotent.
    pub async fn store_request(&self, request: StoreRequest, deadline: Duration) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(CoreEvent::Store {
                request,
                reply: tx,
            })
            .map_err(|_| ConsensusError::ChannelClosed)?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConsensusError::ChannelClosed),
            Err(_) => Err(ConsensusError::CommitTimeout),
        }
    }

    /// Register an application task executed only while this node leads.
    pub fn register(&self, duty: LeaderDuty) -> Result<()> {
        self.events
            .send(CoreEvent::Register { duty })
            .map_err(|_| ConsensusError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(CoreEvent::Status { reply: tx })
            .map_err(|_| ConsensusError::ChannelClosed)?;
        rx.await.map_err(|_| ConsensusError::ChannelClosed)
    }

    /// Transient read of the last `n` ledger entries, oldest first.
    pub async fn tail(&self, n: usize) -> Result<Vec<LogEntry>> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(CoreEvent::Tail { n, reply: tx })
            .map_err(|_| ConsensusError::ChannelClosed)?;
        rx.await.map_err(|_| ConsensusError::ChannelClosed)
    }

    /// Stop the event loop; the core gossips a graceful leave on its way
    /// out.
    pub fn shutdown(&self) {
        let _ = self.events.send(CoreEvent::Shutdown);
    }
}

#[async_trait]
impl Inbound for CoreHandle {
    async fn handle(&self, raw: serde_json::Value) -> Result<Response> {
        self.deliver_raw(raw).await
    }
}
