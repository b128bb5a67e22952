//! ARN Network - Relay pool, transports and health monitoring
//!
//! Publishes signed events to several independent relays and multiplexes
//! their subscriptions into deduplicated per-subscription streams:
//! - `RelayTransport` abstracts one relay connection
//! - `SimulatedRelayTransport` runs against in-memory relays
//! - `SignedRelayTransport` speaks JSON frames over websockets
//! - `RelayHealthMonitor` probes relays and records their status

pub mod dedup;
pub mod error;
pub mod health;
pub mod message;
pub mod pool;
pub mod signed;
pub mod simulated;
pub mod transport;

pub use error::NetworkError;
pub use health::{RelayHealthMonitor, RelayStatusBoard};
pub use pool::{PoolEvent, PoolSubscription, RelayPool};
pub use signed::{SignedRelayConfig, SignedRelayTransport};
pub use simulated::{SimulatedRelay, SimulatedRelayNetwork, SimulatedRelayTransport};
pub use transport::{FrameSender, RelayFrame, RelayTransport};
