//! Signed relay events and subscription filters.
//!
//! Every message on the relay network is an [`Event`]:
//!
//! - `id` is the hex SHA-256 of the canonical array
//!   `[0, pubkey, created_at, kind, tags, content]`
//! - `sig` is the author's hex Ed25519 signature over the raw id bytes
//! - `tags` carry routing data (`p` recipients, `d` identifier, `t`
//!   capabilities, `r` request id) so relays can filter without reading
//!   `content`
//!
//! Relays and subscribers select events with a [`Filter`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::crypto;
use crate::identity::{Identity, PublicKey};
use crate::ProtocolError;

/// The typed event kinds of the agent relay protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AgentAnnouncement,
    AgentRequest,
    AgentResponse,
    AgentDiscovery,
    RelayStatus,
    TaskCoordination,
}

impl EventKind {
    pub fn as_u16(&self) -> u16 {
        match self {
            Self::AgentAnnouncement => KIND_AGENT_ANNOUNCEMENT,
            Self::AgentRequest => KIND_AGENT_REQUEST,
            Self::AgentResponse => KIND_AGENT_RESPONSE,
            Self::AgentDiscovery => KIND_AGENT_DISCOVERY,
            Self::RelayStatus => KIND_RELAY_STATUS,
            Self::TaskCoordination => KIND_TASK_COORDINATION,
        }
    }

    pub fn from_u16(kind: u16) -> Option<Self> {
        match kind {
            KIND_AGENT_ANNOUNCEMENT => Some(Self::AgentAnnouncement),
            KIND_AGENT_REQUEST => Some(Self::AgentRequest),
            KIND_AGENT_RESPONSE => Some(Self::AgentResponse),
            KIND_AGENT_DISCOVERY => Some(Self::AgentDiscovery),
            KIND_RELAY_STATUS => Some(Self::RelayStatus),
            KIND_TASK_COORDINATION => Some(Self::TaskCoordination),
            _ => None,
        }
    }

    /// Directed kinds must tag every intended recipient.
    pub fn is_directed(&self) -> bool {
        matches!(
            self,
            Self::AgentRequest | Self::AgentResponse | Self::TaskCoordination
        )
    }
}

/// True for kinds where relays keep only the newest event per
/// (author, kind, `d` tag).
pub fn is_addressable_kind(kind: u16) -> bool {
    (30000..40000).contains(&kind)
}

/// True for kinds relays forward without storing.
pub fn is_ephemeral_kind(kind: u16) -> bool {
    (20000..30000).contains(&kind)
}

/// A signed relay event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Check the id hash and the author's signature.
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let expected = event_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)?;
        if expected != self.id {
            return Err(ProtocolError::InvalidEvent(format!(
                "id mismatch: expected {expected}, got {}",
                self.id
            )));
        }
        let id_bytes = hex::decode(&self.id)
            .map_err(|e| ProtocolError::InvalidEvent(format!("invalid id hex: {e}")))?;
        crypto::verify_hex_signature(&self.pubkey, &id_bytes, &self.sig)
    }

    pub fn event_kind(&self) -> Option<EventKind> {
        EventKind::from_u16(self.kind)
    }

    pub fn author(&self) -> PublicKey {
        PublicKey::new(self.pubkey.as_str())
    }

    /// All values of tags named `name` (the second element of each tag).
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1).map(String::as_str))
    }

    pub fn first_tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1).map(String::as_str))
    }

    /// Public keys this event is addressed to.
    pub fn recipients(&self) -> Vec<PublicKey> {
        self.tag_values(TAG_RECIPIENT).map(PublicKey::new).collect()
    }

    pub fn is_addressed_to(&self, key: &PublicKey) -> bool {
        self.tag_values(TAG_RECIPIENT).any(|p| p == key.as_str())
    }

    /// The replaceable identifier (`d` tag) of an addressable event.
    pub fn identifier(&self) -> Option<&str> {
        self.first_tag(TAG_IDENTIFIER)
    }

    /// Decode `content` as the entity carried by `expected` kind.
    pub fn parse_content<T: DeserializeOwned>(&self, expected: EventKind) -> Result<T, ProtocolError> {
        if self.kind != expected.as_u16() {
            return Err(ProtocolError::UnexpectedKind {
                expected: expected.as_u16(),
                actual: self.kind,
            });
        }
        serde_json::from_str(&self.content).map_err(|e| ProtocolError::MalformedContent {
            kind: self.kind,
            reason: e.to_string(),
        })
    }

    pub fn created_at_utc(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.created_at as i64, 0).unwrap_or_default()
    }
}

/// An event before signing; the author comes from the signing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    pub fn new(kind: EventKind, content: String) -> Self {
        Self {
            created_at: chrono::Utc::now().timestamp().max(0) as u64,
            kind: kind.as_u16(),
            tags: Vec::new(),
            content,
        }
    }

    /// Serialize `content` as the JSON payload of `kind`.
    pub fn with_json<T: Serialize>(kind: EventKind, content: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(kind, serde_json::to_string(content)?))
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn tag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.tags.push(vec![name.to_string(), value.into()]);
        self
    }

    pub fn recipient(self, key: &PublicKey) -> Self {
        self.tag(TAG_RECIPIENT, key.as_str())
    }

    pub fn sign(self, identity: &Identity) -> Result<Event, ProtocolError> {
        let pubkey = identity.public_key().as_str().to_string();
        let id = event_id(&pubkey, self.created_at, self.kind, &self.tags, &self.content)?;
        let id_bytes = hex::decode(&id)
            .map_err(|e| ProtocolError::InvalidEvent(format!("invalid id hex: {e}")))?;
        let sig = identity.sign(&id_bytes);
        Ok(Event {
            id,
            pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        })
    }
}

fn event_id(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String, ProtocolError> {
    let canonical = serde_json::to_vec(&(0, pubkey, created_at, kind, tags, content))?;
    Ok(hex::encode(crypto::sha256(&canonical)))
}

/// Subscription filter; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(rename = "#p", default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    #[serde(rename = "#d", default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    #[serde(rename = "#t", default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.push(kind.as_u16());
        self
    }

    pub fn author(mut self, key: &PublicKey) -> Self {
        self.authors.push(key.as_str().to_string());
        self
    }

    pub fn recipient(mut self, key: &PublicKey) -> Self {
        self.recipients.push(key.as_str().to_string());
        self
    }

    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifiers.push(id.into());
        self
    }

    pub fn capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(caps.into_iter().map(Into::into));
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        let tag_match = |name: &str, wanted: &[String]| {
            wanted.is_empty() || event.tag_values(name).any(|v| wanted.iter().any(|w| w == v))
        };

        (self.ids.is_empty() || self.ids.contains(&event.id))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && (self.authors.is_empty() || self.authors.contains(&event.pubkey))
            && tag_match(TAG_RECIPIENT, &self.recipients)
            && tag_match(TAG_IDENTIFIER, &self.identifiers)
            && tag_match(TAG_CAPABILITY, &self.capabilities)
            && self.since.map_or(true, |s| event.created_at >= s)
            && self.until.map_or(true, |u| event.created_at <= u)
    }
}
