//! Broker-routed Raft consensus core for distributed services.
//!
//! Peers discover each other through gossip over a publish/subscribe
//! broker, elect a single leader, and replicate an ordered command ledger.
//! The crate is a library: wire a [`transport::Transport`] implementation
//! to your broker client, hand the [`CoreHandle`] to the inbound
//! subscription, and drive [`Core::run`] on its own task.
//!
//! ```no_run
//! use std::sync::Arc;
//! use quorum_bus::{Core, CoreConfig};
//! use quorum_bus::dispatch::NullDispatcher;
//! use quorum_bus::transport::MemoryBus;
//!
//! # #[tokio::main] async fn main() {
//! let bus = MemoryBus::new();
//! let config = CoreConfig::new("node-1");
//! let endpoint = bus.endpoint("consensus.node-1");
//! let (core, handle) = Core::new(config, Arc::new(endpoint), Arc::new(NullDispatcher));
//! bus.register("consensus.node-1", Arc::new(handle.clone())).await;
//! tokio::spawn(core.run());
//! # }
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod membership;
pub mod role;
pub mod rpc;
pub mod state;
pub mod telemetry;
pub mod timer;
pub mod transport;

pub use crate::core::{Core, CoreHandle, LeaderDuty, NodeStatus};
pub use config::CoreConfig;
pub use error::{ConsensusError, Result};
