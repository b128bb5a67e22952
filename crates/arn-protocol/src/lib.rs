//! ARN Protocol - Core types and event definitions
//!
//! Implements the Agent Relay Network (ARN) event envelope: typed, signed
//! relay events carrying JSON-encoded agent profiles, requests, responses
//! and task coordinations, authenticated with Ed25519 signatures.

pub mod constants;
pub mod cost;
pub mod crypto;
pub mod error;
pub mod event;
pub mod identity;
pub mod types;

pub use constants::*;
pub use cost::Cost;
pub use error::*;
pub use event::{Event, EventKind, Filter, UnsignedEvent};
pub use identity::{Identity, PublicKey};
pub use types::*;
