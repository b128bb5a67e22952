//! Agent announcements and discovery queries.

use arn_protocol::constants::{PROTOCOL_VERSION, TAG_CAPABILITY, TAG_IDENTIFIER, TAG_VERSION};
use arn_protocol::{
    AgentAdvertisement, AgentProfile, DiscoveryQuery, Event, EventKind, Identity, ProtocolError,
    UnsignedEvent,
};

use crate::NodeError;

/// Addressable announcement: one live event per (author, `agentId`).
pub fn announcement_event(ad: &AgentAdvertisement, identity: &Identity) -> Result<Event, ProtocolError> {
    let mut unsigned = UnsignedEvent::with_json(EventKind::AgentAnnouncement, ad)?
        .tag(TAG_IDENTIFIER, ad.agent_id.as_str())
        .tag(TAG_VERSION, PROTOCOL_VERSION);
    for capability in &ad.capabilities {
        unsigned = unsigned.tag(TAG_CAPABILITY, capability.as_str());
    }
    unsigned.sign(identity)
}

pub fn discovery_event(query: &DiscoveryQuery, identity: &Identity) -> Result<Event, ProtocolError> {
    let mut unsigned = UnsignedEvent::with_json(EventKind::AgentDiscovery, query)?;
    for capability in &query.capabilities {
        unsigned = unsigned.tag(TAG_CAPABILITY, capability.as_str());
    }
    unsigned.sign(identity)
}

/// Profile carried by a verified announcement, seen on `relay_url`.
pub fn profile_from_event(event: &Event, relay_url: &str) -> Result<AgentProfile, NodeError> {
    let ad: AgentAdvertisement = event
        .parse_content(EventKind::AgentAnnouncement)
        .map_err(|e| NodeError::MalformedEvent(e.to_string()))?;
    ad.validate()
        .map_err(|e| NodeError::MalformedEvent(e.to_string()))?;
    if let Some(identifier) = event.identifier() {
        if identifier != ad.agent_id {
            return Err(NodeError::MalformedEvent(format!(
                "announcement identifier {identifier} does not match agentId {}",
                ad.agent_id
            )));
        }
    }

    let mut profile = AgentProfile::from_advertisement(ad, event.author(), event.created_at_utc());
    profile.relays.insert(relay_url.to_string());
    Ok(profile)
}
