use std::time::Duration;

use arn_protocol::{AgentAdvertisement, AgentProfile, PublicKey};
use arn_state::registry::*;
use chrono::{DateTime, TimeZone, Utc};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn profile(agent_id: &str, reputation: f64, cost: &str, seen: DateTime<Utc>) -> AgentProfile {
    let ad = AgentAdvertisement::new(agent_id, agent_id.to_uppercase(), cost.parse().unwrap())
        .with_capability("technical_analysis")
        .with_reputation(reputation);
    AgentProfile::from_advertisement(ad, PublicKey::new(format!("{agent_id}-key")), seen)
}

#[test]
fn test_reannouncement_keeps_one_entry_with_latest_seen() {
    let mut reg = AgentRegistry::new();
    assert_eq!(reg.upsert(profile("a", 0.5, "$1", at(0))), UpsertOutcome::Inserted);
    assert_eq!(reg.upsert(profile("a", 0.7, "$1", at(10))), UpsertOutcome::Updated);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.get("a").unwrap().last_seen, at(10));
    assert_eq!(reg.get("a").unwrap().reputation, 0.7);
}

#[test]
fn test_heartbeat_refreshes_without_news() {
    let mut reg = AgentRegistry::new();
    assert!(reg.upsert(profile("a", 0.5, "$1", at(0))).is_news());
    let mut again = profile("a", 0.5, "$1", at(30));
    again.relays.insert("wss://two".into());
    let outcome = reg.upsert(again);
    assert_eq!(outcome, UpsertOutcome::Refreshed);
    assert!(!outcome.is_news());
    assert_eq!(reg.get("a").unwrap().last_seen, at(30));
    assert!(reg.get("a").unwrap().relays.contains("wss://two"));
}

#[test]
fn test_out_of_order_announcement_ignored() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("a", 0.7, "$1", at(10)));
    assert_eq!(reg.upsert(profile("a", 0.1, "$1", at(5))), UpsertOutcome::Ignored);
    assert_eq!(reg.get("a").unwrap().reputation, 0.7);
    assert_eq!(reg.get("a").unwrap().last_seen, at(10));
}

#[test]
fn test_relays_accumulate_across_refresh() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("a", 0.5, "$1", at(0)));
    reg.record_relay("a", "wss://one");
    let mut refreshed = profile("a", 0.5, "$1", at(5));
    refreshed.relays.insert("wss://two".into());
    reg.upsert(refreshed);

    let relays: Vec<_> = reg.get("a").unwrap().relays.iter().cloned().collect();
    assert_eq!(relays, vec!["wss://one", "wss://two"]);
    let counts = reg.relay_agent_counts();
    assert_eq!(counts.get("wss://one"), Some(&1));
    assert_eq!(counts.get("wss://two"), Some(&1));
}

#[test]
fn test_find_by_capability_orders_by_reputation() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("low", 0.2, "$1", at(0)));
    reg.upsert(profile("high", 0.9, "$1", at(0)));
    reg.upsert(profile("mid", 0.5, "$1", at(0)));

    let ids: Vec<_> = reg
        .find_by_capability("technical_analysis")
        .into_iter()
        .map(|p| p.agent_id)
        .collect();
    assert_eq!(ids, vec!["high", "mid", "low"]);
    assert!(reg.find_by_capability("sentiment").is_empty());
}

// ─── Best-agent selection ────────────────────────────────────────────────────

#[test]
fn test_budget_dominates_reputation() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("A", 0.9, "$0.05", at(0)));
    reg.upsert(profile("B", 0.6, "$0.01", at(0)));

    let budget = "$0.02".parse().unwrap();
    let within = reg.find_best_agent("technical_analysis", Some(&budget)).unwrap();
    assert_eq!(within.agent_id, "B");

    let unconstrained = reg.find_best_agent("technical_analysis", None).unwrap();
    assert_eq!(unconstrained.agent_id, "A");
}

#[test]
fn test_over_budget_candidate_used_as_fallback() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("A", 0.9, "$0.05", at(0)));
    reg.upsert(profile("C", 0.4, "$0.09", at(0)));

    let budget = "$0.01".parse().unwrap();
    let best = reg.find_best_agent("technical_analysis", Some(&budget)).unwrap();
    assert_eq!(best.agent_id, "A", "highest reputation among over-budget candidates");
    assert!(reg.find_best_agent("macro", Some(&budget)).is_none());
}

#[test]
fn test_reputation_tie_broken_by_agent_id() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("zeta", 0.5, "$1", at(0)));
    reg.upsert(profile("alpha", 0.5, "$1", at(0)));
    assert_eq!(reg.find_best_agent("technical_analysis", None).unwrap().agent_id, "alpha");
}

// ─── Staleness eviction ──────────────────────────────────────────────────────

#[test]
fn test_eviction_only_after_threshold() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("old", 0.5, "$1", at(0)));
    reg.upsert(profile("fresh", 0.5, "$1", at(500)));
    let threshold = Duration::from_secs(600);

    assert!(reg.evict_stale(at(600), threshold).is_empty(), "exactly at threshold is kept");
    assert_eq!(reg.find_by_capability("technical_analysis").len(), 2);

    let evicted = reg.evict_stale(at(601), threshold);
    assert_eq!(evicted, vec!["old".to_string()]);
    assert!(reg.get("old").is_none());
    assert!(reg.get("fresh").is_some());
}

#[test]
fn test_future_last_seen_not_evicted() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("ahead", 0.5, "$1", at(1_000)));
    assert!(reg.evict_stale(at(0), Duration::from_secs(1)).is_empty());
}

#[test]
fn test_lookup_by_public_key() {
    let mut reg = AgentRegistry::new();
    reg.upsert(profile("a", 0.5, "$1", at(0)));
    assert_eq!(reg.public_key_of("a"), Some(PublicKey::new("a-key")));
    assert!(reg.public_key_of("missing").is_none());
}
