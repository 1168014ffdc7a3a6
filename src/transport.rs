//! Broker transport contract and the in-process reference bus.
//!
//! The core is agnostic to broker topology, auth, and reconnect policy;
//! it only needs point-to-point `call`/`send` plus role-broadcast
//! addressing (`"<group>.<peer>"` direct, `"<group>.*"` fan-out). Real
//! integrations adapt a broker client to [`Transport`]; [`MemoryBus`]
//! provides the same semantics in-process for tests and examples.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ConsensusError, Result};
use crate::rpc::{self, Envelope, Response};

/// Outbound messaging surface consumed by the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request/response with a deadline. A missed deadline surfaces as
    /// [`ConsensusError::TransportTimeout`]; the transport never retries.
    async fn call(&self, dst: &str, envelope: Envelope, timeout: Duration) -> Result<Response>;

    /// Fire-and-forget delivery. Broadcast subjects fan out to every
    /// matching subscriber.
    async fn send(&self, dst: &str, envelope: Envelope) -> Result<()>;
}

/// Inbound delivery surface a transport integration drives. Raw JSON in,
/// typed response out; malformed input is the receiver's
/// `ProtocolViolation` to report.
#[async_trait]
pub trait Inbound: Send + Sync {
    async fn handle(&self, raw: serde_json::Value) -> Result<Response>;
}

/// Backoff parameters for re-establishing the broker connection. Only the
/// initial connection is retried; RPC calls are never retried by the
/// transport layer.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl ReconnectPolicy {
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Exponential backoff for the given zero-based attempt, capped at
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempt >= max)
    }
}

struct BusInner {
    subscribers: HashMap<String, Arc<dyn Inbound>>,
    detached: HashSet<String>,
}

/// In-process pub/sub bus with broker-shaped addressing.
///
/// Every delivery round-trips through JSON so the serde wire surface is
/// exercised exactly as a real broker payload would be. Detached subjects
/// go silent in both directions, which makes network partitions cheap to
/// stage in tests.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                subscribers: HashMap::new(),
                detached: HashSet::new(),
            })),
        }
    }

    /// Subscribe a receiver at a direct subject.
    pub async fn register(&self, subject: impl Into<String>, handler: Arc<dyn Inbound>) {
        self.inner
            .lock()
            .await
            .subscribers
            .insert(subject.into(), handler);
    }

    /// Cut a subject off in both directions (simulated partition).
    pub async fn detach(&self, subject: &str) {
        self.inner.lock().await.detached.insert(subject.to_string());
    }

    /// Heal a previously detached subject.
    pub async fn reattach(&self, subject: &str) {
        self.inner.lock().await.detached.remove(subject);
    }

    /// The transport endpoint a node at `subject` uses for its outbound
    /// traffic. Binding the local subject lets a partition silence the
    /// node's own calls as well as its inbox.
    pub fn endpoint(&self, subject: impl Into<String>) -> MemoryBusEndpoint {
        MemoryBusEndpoint {
            bus: self.clone(),
            local: subject.into(),
        }
    }

    async fn lookup(&self, subject: &str, local: &str) -> Option<Arc<dyn Inbound>> {
        let inner = self.inner.lock().await;
        if inner.detached.contains(local) || inner.detached.contains(subject) {
            return None;
        }
        inner.subscribers.get(subject).cloned()
    }

    async fn fanout(&self, prefix: &str, local: &str) -> Vec<Arc<dyn Inbound>> {
        let inner = self.inner.lock().await;
        if inner.detached.contains(local) {
            return Vec::new();
        }
        inner
            .subscribers
            .iter()
            .filter(|(subject, _)| {
                subject.starts_with(prefix) && !inner.detached.contains(*subject)
            })
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

/// Per-node handle onto a [`MemoryBus`].
#[derive(Clone)]
pub struct MemoryBusEndpoint {
    bus: MemoryBus,
    local: String,
}

#[async_trait]
impl Transport for MemoryBusEndpoint {
    async fn call(&self, dst: &str, envelope: Envelope, timeout: Duration) -> Result<Response> {
        if rpc::is_broadcast(dst) {
            return Err(ConsensusError::ProtocolViolation(format!(
                "call requires a direct subject, got {dst}"
            )));
        }
        let handler = self.bus.lookup(dst, &self.local).await;
        let Some(handler) = handler else {
            // Unreachable or detached peers are silence, not a fast error.
            tokio::time::sleep(timeout).await;
            return Err(ConsensusError::TransportTimeout(dst.to_string()));
        };
        let raw = serde_json::to_value(&envelope)
            .map_err(|e| ConsensusError::Transport(e.to_string()))?;
        match tokio::time::timeout(timeout, handler.handle(raw)).await {
            Ok(result) => result,
            Err(_) => Err(ConsensusError::TransportTimeout(dst.to_string())),
        }
    }

    async fn send(&self, dst: &str, envelope: Envelope) -> Result<()> {
        let raw = serde_json::to_value(&envelope)
            .map_err(|e| ConsensusError::Transport(e.to_string()))?;
        let handlers = if rpc::is_broadcast(dst) {
            let prefix = dst.trim_end_matches('*');
            self.bus.fanout(prefix, &self.local).await
        } else {
            self.bus
                .lookup(dst, &self.local)
                .await
                .into_iter()
                .collect()
        };
        for handler in handlers {
            let raw = raw.clone();
            tokio::spawn(async move {
                let _ = handler.handle(raw).await;
            });
        }
        Ok(())
    }
}
