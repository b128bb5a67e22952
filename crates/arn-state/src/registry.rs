//! Known agent profiles, keyed by `agentId`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use arn_protocol::{AgentProfile, Cost, PublicKey};
use chrono::{DateTime, Utc};

/// What [`AgentRegistry::upsert`] did with a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The advertisement or the announcing key changed.
    Updated,
    /// Same advertisement again; `lastSeen` and relays were refreshed.
    Refreshed,
    /// The registry already holds a newer announcement.
    Ignored,
}

impl UpsertOutcome {
    /// Whether observers should hear about this upsert.
    pub fn is_news(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentProfile>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by `agentId`; last write wins by `lastSeen`.
    ///
    /// Relays the agent was seen on accumulate across announcements.
    pub fn upsert(&mut self, mut profile: AgentProfile) -> UpsertOutcome {
        match self.agents.get_mut(&profile.agent_id) {
            None => {
                tracing::debug!(agent_id = %profile.agent_id, "Registered agent");
                self.agents.insert(profile.agent_id.clone(), profile);
                UpsertOutcome::Inserted
            }
            Some(existing) if profile.last_seen < existing.last_seen => {
                existing.relays.extend(profile.relays);
                UpsertOutcome::Ignored
            }
            Some(existing) => {
                let changed = existing.public_key != profile.public_key
                    || existing.advertisement() != profile.advertisement();
                if existing.public_key != profile.public_key {
                    tracing::warn!(
                        agent_id = %profile.agent_id,
                        previous = %existing.public_key.short(),
                        current = %profile.public_key.short(),
                        "Agent re-announced under a different identity"
                    );
                } else {
                    profile.relays.extend(std::mem::take(&mut existing.relays));
                }
                *existing = profile;
                if changed {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Refreshed
                }
            }
        }
    }

    /// Note that `agent_id`'s announcement was seen on `relay_url`.
    pub fn record_relay(&mut self, agent_id: &str, relay_url: &str) {
        if let Some(profile) = self.agents.get_mut(agent_id) {
            profile.relays.insert(relay_url.to_string());
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.agents.get(agent_id)
    }

    pub fn public_key_of(&self, agent_id: &str) -> Option<PublicKey> {
        self.agents.get(agent_id).map(|p| p.public_key.clone())
    }

    /// All profiles, ordered by `agentId`.
    pub fn all(&self) -> Vec<AgentProfile> {
        let mut all: Vec<AgentProfile> = self.agents.values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }

    /// Profiles advertising `capability`, best reputation first.
    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentProfile> {
        let mut matches: Vec<AgentProfile> = self
            .agents
            .values()
            .filter(|p| p.has_capability(capability))
            .cloned()
            .collect();
        matches.sort_by(by_reputation);
        matches
    }

    /// Profiles advertising any of `capabilities` (all profiles when empty),
    /// best reputation first.
    pub fn find_by_any_capability(&self, capabilities: &[String]) -> Vec<AgentProfile> {
        let mut matches: Vec<AgentProfile> = self
            .agents
            .values()
            .filter(|p| capabilities.is_empty() || capabilities.iter().any(|c| p.has_capability(c)))
            .cloned()
            .collect();
        matches.sort_by(by_reputation);
        matches
    }

    /// Pick the agent for `task_type`.
    ///
    /// With a budget, any candidate whose cost fits beats every candidate
    /// that does not; reputation only orders candidates within a group.
    pub fn find_best_agent(&self, task_type: &str, max_cost: Option<&Cost>) -> Option<AgentProfile> {
        let candidates = self.find_by_capability(task_type);
        match max_cost {
            None => candidates.into_iter().next(),
            Some(budget) => {
                let (within, over): (Vec<_>, Vec<_>) = candidates
                    .into_iter()
                    .partition(|p| p.cost.fits_within(budget));
                within.into_iter().next().or_else(|| over.into_iter().next())
            }
        }
    }

    /// Remove profiles whose `lastSeen` is more than `threshold` before `now`.
    /// Returns the evicted `agentId`s.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, threshold: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .agents
            .values()
            .filter(|p| {
                now.signed_duration_since(p.last_seen)
                    .to_std()
                    .map(|age| age > threshold)
                    .unwrap_or(false)
            })
            .map(|p| p.agent_id.clone())
            .collect();

        for agent_id in &stale {
            self.agents.remove(agent_id);
            tracing::debug!(agent_id = %agent_id, "Evicted stale agent");
        }
        stale
    }

    /// Number of known agents associated with each relay.
    pub fn relay_agent_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for profile in self.agents.values() {
            for relay in &profile.relays {
                *counts.entry(relay.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn by_reputation(a: &AgentProfile, b: &AgentProfile) -> Ordering {
    b.reputation
        .total_cmp(&a.reputation)
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}
