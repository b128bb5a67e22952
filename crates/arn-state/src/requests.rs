use std::collections::HashMap;
use std::time::Duration;

use arn_protocol::AgentRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StateError;

/// A request addressed to this node that has not been answered yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundRequest {
    pub request: AgentRequest,
    /// Id of the event that carried the request.
    pub event_id: String,
    pub received_at: DateTime<Utc>,
}

/// Requests awaiting a response, in both directions.
///
/// Outbound entries are ours, waiting on a remote agent; inbound entries
/// were sent to us and wait on `respond_to_request`.
#[derive(Debug, Default)]
pub struct PendingRequests {
    outbound: HashMap<String, AgentRequest>,
    inbound: HashMap<String, InboundRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_outbound(&mut self, request: AgentRequest) -> Result<(), StateError> {
        if self.outbound.contains_key(&request.request_id) {
            return Err(StateError::DuplicateRequest(request.request_id));
        }
        self.outbound.insert(request.request_id.clone(), request);
        Ok(())
    }

    /// Remove and return the outbound entry a response answers. `None` for
    /// unknown or already resolved ids.
    pub fn resolve_outbound(&mut self, request_id: &str) -> Option<AgentRequest> {
        self.outbound.remove(request_id)
    }

    /// Drop an outbound entry without a response.
    pub fn cancel(&mut self, request_id: &str) -> bool {
        self.outbound.remove(request_id).is_some()
    }

    /// Hold an inbound request until answered. The first copy wins.
    pub fn record_inbound(&mut self, inbound: InboundRequest) -> bool {
        let request_id = inbound.request.request_id.clone();
        if self.inbound.contains_key(&request_id) {
            return false;
        }
        self.inbound.insert(request_id, inbound);
        true
    }

    pub fn inbound(&self, request_id: &str) -> Option<&InboundRequest> {
        self.inbound.get(request_id)
    }

    pub fn take_inbound(&mut self, request_id: &str) -> Result<InboundRequest, StateError> {
        self.inbound
            .remove(request_id)
            .ok_or_else(|| StateError::UnknownRequest(request_id.to_string()))
    }

    /// Drop inbound requests nobody answered: those past their deadline or
    /// held longer than `max_age`. Returns the expired request ids.
    pub fn expire_inbound(&mut self, now: DateTime<Utc>, max_age: Duration) -> Vec<String> {
        let mut expired: Vec<String> = self
            .inbound
            .iter()
            .filter(|(_, held)| {
                let overdue = held.request.deadline.is_some_and(|deadline| deadline < now);
                let too_old = now
                    .signed_duration_since(held.received_at)
                    .to_std()
                    .map(|age| age > max_age)
                    .unwrap_or(false);
                overdue || too_old
            })
            .map(|(request_id, _)| request_id.clone())
            .collect();
        expired.sort();
        for request_id in &expired {
            self.inbound.remove(request_id);
        }
        expired
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Both directions together.
    pub fn len(&self) -> usize {
        self.outbound.len() + self.inbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
