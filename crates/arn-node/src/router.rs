//! Routing of service requests and responses onto relay events.
//!
//! A request naming a known `targetAgent` goes to that agent's key alone.
//! Otherwise it is addressed to every known agent advertising the task
//! type; an unresolvable target falls back to that broadcast.

use arn_protocol::constants::{TAG_CAPABILITY, TAG_REQUEST};
use arn_protocol::{
    new_request_id, AgentRequest, AgentResponse, Event, EventKind, Identity, ProtocolError,
    PublicKey, ServiceRequest, UnsignedEvent,
};
use arn_state::AgentRegistry;

use crate::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    Direct,
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub mode: RouteMode,
    /// Distinct recipient keys, best reputation first for broadcasts.
    pub recipients: Vec<PublicKey>,
}

/// Turn a caller's request into the wire request, assigning an id if needed.
pub fn build_request(
    service: ServiceRequest,
    requester: PublicKey,
    relays: Vec<String>,
) -> Result<AgentRequest, NodeError> {
    if service.task_type.trim().is_empty() {
        return Err(NodeError::InvalidRequest("taskType is required".into()));
    }
    let request_id = match service.request_id {
        Some(id) if id.trim().is_empty() => {
            return Err(NodeError::InvalidRequest("requestId must not be empty".into()))
        }
        Some(id) => id,
        None => new_request_id(),
    };
    Ok(AgentRequest {
        request_id,
        task_type: service.task_type,
        payload: service.payload,
        requester_pubkey: requester,
        target_agent: service.target_agent,
        max_cost: service.max_cost,
        deadline: service.deadline,
        relays,
    })
}

pub fn route_request(registry: &AgentRegistry, request: &AgentRequest) -> Route {
    if let Some(target) = &request.target_agent {
        match registry.public_key_of(target) {
            Some(key) => {
                return Route {
                    mode: RouteMode::Direct,
                    recipients: vec![key],
                }
            }
            None => tracing::debug!(
                request_id = %request.request_id,
                target = %target,
                "Target agent unknown, broadcasting by capability"
            ),
        }
    }

    let mut recipients: Vec<PublicKey> = Vec::new();
    for profile in registry.find_by_capability(&request.task_type) {
        if !recipients.contains(&profile.public_key) {
            recipients.push(profile.public_key);
        }
    }
    Route {
        mode: RouteMode::Broadcast,
        recipients,
    }
}

pub fn request_event(
    request: &AgentRequest,
    route: &Route,
    identity: &Identity,
) -> Result<Event, ProtocolError> {
    let mut unsigned = UnsignedEvent::with_json(EventKind::AgentRequest, request)?
        .tag(TAG_REQUEST, request.request_id.as_str())
        .tag(TAG_CAPABILITY, request.task_type.as_str());
    for key in &route.recipients {
        unsigned = unsigned.recipient(key);
    }
    unsigned.sign(identity)
}

/// Response addressed back to the requester.
pub fn response_event(
    response: &AgentResponse,
    requester: &PublicKey,
    identity: &Identity,
) -> Result<Event, ProtocolError> {
    UnsignedEvent::with_json(EventKind::AgentResponse, response)?
        .tag(TAG_REQUEST, response.request_id.as_str())
        .recipient(requester)
        .sign(identity)
}
