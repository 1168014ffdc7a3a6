//! Logging and tracing-context plumbing.
//!
//! Call [`init_logging`] once at process startup. Log levels are taken
//! from `RUST_LOG`, defaulting to `info`. Every outbound envelope carries
//! a [`TraceContext`] so a request can be followed across peers.

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Correlation context propagated on RPC envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: Uuid,
}

impl TraceContext {
    /// Start a fresh trace (root of a new operation).
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
        }
    }

    /// Continue an existing trace on a downstream hop.
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::root()
    }
}

/// Span for a locally-originated operation.
pub fn root_span(op: &str, trace: &TraceContext) -> Span {
    tracing::info_span!("op", op = %op, trace_id = %trace.trace_id)
}

/// Span for a hop continuing a remote caller's trace.
pub fn child_span(parent: &Span, op: &str) -> Span {
    tracing::info_span!(parent: parent, "op", op = %op)
}

/// Install the global subscriber. Safe to call once per process; returns
/// quietly if a subscriber is already set (useful in tests).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_keeps_the_trace_id() {
        let root = TraceContext::root();
        assert_eq!(root.child().trace_id, root.trace_id);
    }

    #[test]
    fn roots_are_distinct() {
        assert_ne!(TraceContext::root().trace_id, TraceContext::root().trace_id);
    }
}
