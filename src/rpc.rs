//! RPC envelopes and message bodies.
//!
//! The logical schema is `{mode, payload, trace?}`; the broker owns the
//! real wire encoding, so these types only fix the JSON-shaped layer the
//! transport serializes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{Command, LogEntry};
use crate::membership::GossipMessage;
use crate::telemetry::TraceContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: String,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    /// Follower's last log index, a resync hint for the leader.
    pub match_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: String,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub granted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRequest {
    /// Idempotency key: a replayed request resolves to the index the
    /// original append produced.
    pub request_id: Uuid,
    pub command: Command,
}

impl StoreRequest {
    pub fn new(command: Command) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub index: u64,
    pub committed: bool,
}

/// Inbound RPC bodies, tagged by mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "payload")]
pub enum Request {
    AppendEntries(AppendEntriesRequest),
    RequestVote(VoteRequest),
    RequestStore(StoreRequest),
    Broadcast(GossipMessage),
}

impl Request {
    pub fn mode(&self) -> &'static str {
        match self {
            Request::AppendEntries(_) => "AppendEntries",
            Request::RequestVote(_) => "RequestVote",
            Request::RequestStore(_) => "RequestStore",
            Request::Broadcast(_) => "Broadcast",
        }
    }
}

/// Reply bodies, tagged the same way. `Ack` answers fire-and-forget
/// deliveries that carry no payload back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "payload")]
pub enum Response {
    AppendEntries(AppendEntriesResponse),
    RequestVote(VoteResponse),
    RequestStore(StoreResponse),
    Ack,
}

/// One outbound message: a request body plus optional trace context.
/// Constructed fresh per call; owned by the transport once handed over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub body: Request,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

impl Envelope {
    pub fn new(body: Request) -> Self {
        Self { body, trace: None }
    }

    pub fn with_trace(body: Request, trace: TraceContext) -> Self {
        Self {
            body,
            trace: Some(trace),
        }
    }

    pub fn mode(&self) -> &'static str {
        self.body.mode()
    }
}

/// Subject for a point-to-point delivery.
pub fn direct(group: &str, peer_id: &str) -> String {
    format!("{group}.{peer_id}")
}

/// Subject reaching every peer sharing this node's role.
pub fn broadcast(group: &str) -> String {
    format!("{group}.*")
}

pub fn is_broadcast(subject: &str) -> bool {
    subject.ends_with(".*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_mode_and_payload() {
        let env = Envelope::new(Request::RequestVote(VoteRequest {
            term: 3,
            candidate_id: "node-2".to_string(),
            last_log_index: 9,
            last_log_term: 2,
        }));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["mode"], "RequestVote");
        assert_eq!(value["payload"]["candidate_id"], "node-2");
        assert!(value.get("trace").is_none());

        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn envelope_round_trips_trace_context() {
        let trace = TraceContext::root();
        let env = Envelope::with_trace(
            Request::Broadcast(GossipMessage {
                peer_id: "node-3".to_string(),
                joining: true,
            }),
            trace.clone(),
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trace, Some(trace));
    }

    #[test]
    fn unknown_mode_fails_to_parse() {
        let raw = serde_json::json!({ "mode": "Teleport", "payload": {} });
        assert!(serde_json::from_value::<Envelope>(raw).is_err());
    }

    #[test]
    fn subjects() {
        assert_eq!(direct("consensus", "node-2"), "consensus.node-2");
        assert_eq!(broadcast("consensus"), "consensus.*");
        assert!(is_broadcast("consensus.*"));
        assert!(!is_broadcast("consensus.node-2"));
    }
}
