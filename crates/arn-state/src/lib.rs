//! ARN State - In-memory tables owned by a running network node
//!
//! - `AgentRegistry`: known agent profiles with last-write-wins refresh and
//!   staleness eviction
//! - `PendingRequests`: outbound requests awaiting a response and inbound
//!   requests awaiting our answer
//! - `TaskLog`: bounded history of task coordinations

pub mod coordination;
pub mod error;
pub mod registry;
pub mod requests;

pub use coordination::{TaskDirection, TaskLog, TaskRecord, MAX_TASK_LOG_ENTRIES};
pub use error::StateError;
pub use registry::{AgentRegistry, UpsertOutcome};
pub use requests::{InboundRequest, PendingRequests};
