//! ARN Node - The agent network facade
//!
//! Ties the relay pool to the node's tables:
//! - `AgentNetwork`: lifecycle, announcements, discovery, requests,
//!   responses and task coordination
//! - `NodeConfig`: TOML configuration with environment overrides
//! - `Notifications`: per-subscriber notification channels

pub mod announce;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod network;
pub mod notify;
pub mod router;

pub use config::{NodeConfig, TransportKind};
pub use error::NodeError;
pub use network::{websocket_transports, AgentNetwork, NodeState};
pub use notify::{Notifications, Topic};
pub use router::{Route, RouteMode};
