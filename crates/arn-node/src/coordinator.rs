//! Multi-agent task coordination events.

use arn_protocol::constants::TAG_IDENTIFIER;
use arn_protocol::{Event, EventKind, Identity, ProtocolError, PublicKey, TaskCoordination, UnsignedEvent};
use arn_state::AgentRegistry;

/// Participants of a coordination that could be resolved to a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participants {
    /// Resolved agent ids in the order given, without repeats.
    pub agent_ids: Vec<String>,
    /// Distinct keys to address; one key may host several agents.
    pub keys: Vec<PublicKey>,
}

/// Look up each agent's key. Unknown agents are logged and left out.
pub fn resolve_participants(registry: &AgentRegistry, task_id: &str, agent_ids: &[String]) -> Participants {
    let mut resolved = Participants::default();
    for agent_id in agent_ids {
        if resolved.agent_ids.contains(agent_id) {
            continue;
        }
        match registry.public_key_of(agent_id) {
            Some(key) => {
                resolved.agent_ids.push(agent_id.clone());
                if !resolved.keys.contains(&key) {
                    resolved.keys.push(key);
                }
            }
            None => tracing::warn!(task_id, agent_id = %agent_id, "Skipping unknown participant"),
        }
    }
    resolved
}

/// Coordination addressed to every participant key. The `d` tag carries the
/// task id for filtering; the kind is not replaceable so relays keep each one.
pub fn coordination_event(
    coordination: &TaskCoordination,
    participants: &[PublicKey],
    identity: &Identity,
) -> Result<Event, ProtocolError> {
    let mut unsigned = UnsignedEvent::with_json(EventKind::TaskCoordination, coordination)?
        .tag(TAG_IDENTIFIER, coordination.task_id.as_str());
    for key in participants {
        unsigned = unsigned.recipient(key);
    }
    unsigned.sign(identity)
}
