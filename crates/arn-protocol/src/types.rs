use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::Cost;
use crate::identity::PublicKey;
use crate::ProtocolError;

/// What an agent advertises about itself, before the network attaches
/// its identity and relay bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAdvertisement {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Informational only; never used for routing.
    #[serde(default)]
    pub specialties: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_reputation")]
    pub reputation: f64,
    pub cost: Cost,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl AgentAdvertisement {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>, cost: Cost) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            capabilities: BTreeSet::new(),
            specialties: BTreeSet::new(),
            reputation: 0.0,
            cost,
            endpoint: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialties.insert(specialty.into());
        self
    }

    pub fn with_reputation(mut self, reputation: f64) -> Self {
        self.reputation = clamp_reputation(reputation);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.agent_id.trim().is_empty() {
            return Err(ProtocolError::InvalidEvent("agentId must not be empty".into()));
        }
        Ok(())
    }

    /// True when this agent advertises any of `wanted` (or `wanted` is empty).
    pub fn offers_any(&self, wanted: &[String]) -> bool {
        wanted.is_empty() || wanted.iter().any(|c| self.capabilities.contains(c))
    }
}

/// A known agent as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub agent_id: String,
    pub name: String,
    pub capabilities: BTreeSet<String>,
    pub specialties: BTreeSet<String>,
    pub reputation: f64,
    pub cost: Cost,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub public_key: PublicKey,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub relays: BTreeSet<String>,
}

impl AgentProfile {
    pub fn from_advertisement(
        ad: AgentAdvertisement,
        public_key: PublicKey,
        last_seen: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: ad.agent_id,
            name: ad.name,
            capabilities: ad.capabilities,
            specialties: ad.specialties,
            reputation: clamp_reputation(ad.reputation),
            cost: ad.cost,
            endpoint: ad.endpoint,
            public_key,
            last_seen,
            relays: BTreeSet::new(),
        }
    }

    pub fn advertisement(&self) -> AgentAdvertisement {
        AgentAdvertisement {
            agent_id: self.agent_id.clone(),
            name: self.name.clone(),
            capabilities: self.capabilities.clone(),
            specialties: self.specialties.clone(),
            reputation: self.reputation,
            cost: self.cost.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Keep reputation in 0.0..=1.0; NaN counts as no reputation.
pub fn clamp_reputation(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn deserialize_reputation<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    f64::deserialize(deserializer).map(clamp_reputation)
}

/// Fresh identifier for a request the caller did not name.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A service request as submitted by a caller, before routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    /// Assigned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub task_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<Cost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl ServiceRequest {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            request_id: None,
            task_type: task_type.into(),
            payload,
            target_agent: None,
            max_cost: None,
            deadline: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_target(mut self, agent_id: impl Into<String>) -> Self {
        self.target_agent = Some(agent_id.into());
        self
    }

    pub fn with_max_cost(mut self, max_cost: Cost) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Content of an `AGENT_REQUEST` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub request_id: String,
    pub task_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub requester_pubkey: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<Cost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub relays: Vec<String>,
}

/// Content of an `AGENT_RESPONSE` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub request_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub result: serde_json::Value,
    pub cost: Cost,
    /// Hex Ed25519 signature over [`AgentResponse::signing_payload`].
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseSigningView<'a> {
    request_id: &'a str,
    agent_id: &'a str,
    result: &'a serde_json::Value,
    cost: &'a Cost,
    timestamp: &'a DateTime<Utc>,
}

impl AgentResponse {
    /// Build and sign a response as `identity`.
    pub fn signed(
        identity: &crate::Identity,
        request_id: impl Into<String>,
        agent_id: impl Into<String>,
        result: serde_json::Value,
        cost: Cost,
    ) -> Result<Self, ProtocolError> {
        let mut response = Self {
            request_id: request_id.into(),
            agent_id: agent_id.into(),
            result,
            cost,
            signature: String::new(),
            timestamp: Utc::now(),
        };
        response.signature = identity.sign(&response.signing_payload()?);
        Ok(response)
    }

    /// Canonical bytes covered by `signature`.
    pub fn signing_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let view = ResponseSigningView {
            request_id: &self.request_id,
            agent_id: &self.agent_id,
            result: &self.result,
            cost: &self.cost,
            timestamp: &self.timestamp,
        };
        Ok(serde_json::to_vec(&view)?)
    }

    pub fn verify(&self, signer: &PublicKey) -> Result<(), ProtocolError> {
        crate::crypto::verify_hex_signature(signer.as_str(), &self.signing_payload()?, &self.signature)
    }
}

/// Connectivity of one relay as last observed by the health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub url: String,
    pub connected: bool,
    /// Round-trip milliseconds, or -1 when unreachable.
    pub latency_ms: i64,
    pub agent_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ping: Option<DateTime<Utc>>,
}

impl RelayStatus {
    pub fn unknown(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connected: false,
            latency_ms: crate::constants::UNREACHABLE_LATENCY_MS,
            agent_count: 0,
            last_ping: None,
        }
    }
}

/// Content of a `TASK_COORDINATION` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCoordination {
    pub task_id: String,
    pub coordinator: PublicKey,
    /// Participating agent ids, in the order given by the coordinator.
    pub agents: Vec<String>,
    #[serde(default)]
    pub task_data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Content of an `AGENT_DISCOVERY` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryQuery {
    pub requester: PublicKey,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Point-in-time summary returned by the network facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub is_running: bool,
    pub connected_relays: usize,
    pub total_relays: usize,
    pub known_agents: usize,
    pub active_requests: usize,
    pub task_coordinations: usize,
    pub uptime_secs: u64,
}
