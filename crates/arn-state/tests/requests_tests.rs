use std::time::Duration;

use arn_protocol::{AgentRequest, PublicKey};
use arn_state::*;
use chrono::{TimeZone, Utc};

fn request(id: &str) -> AgentRequest {
    AgentRequest {
        request_id: id.into(),
        task_type: "technical_analysis".into(),
        payload: serde_json::json!({"symbol": "AAPL"}),
        requester_pubkey: PublicKey::new("requester"),
        target_agent: None,
        max_cost: None,
        deadline: None,
        relays: vec![],
    }
}

fn inbound(id: &str) -> InboundRequest {
    InboundRequest {
        request: request(id),
        event_id: format!("ev-{id}"),
        received_at: Utc::now(),
    }
}

#[test]
fn test_duplicate_outbound_rejected() {
    let mut pending = PendingRequests::new();
    pending.insert_outbound(request("r1")).unwrap();
    assert!(matches!(
        pending.insert_outbound(request("r1")),
        Err(StateError::DuplicateRequest(id)) if id == "r1"
    ));
    assert_eq!(pending.outbound_len(), 1);
}

#[test]
fn test_resolve_only_once() {
    let mut pending = PendingRequests::new();
    pending.insert_outbound(request("r1")).unwrap();
    assert!(pending.resolve_outbound("r1").is_some());
    assert!(pending.resolve_outbound("r1").is_none());
    assert!(pending.resolve_outbound("never-sent").is_none());
    assert!(pending.is_empty());
}

#[test]
fn test_cancel_drops_entry() {
    let mut pending = PendingRequests::new();
    pending.insert_outbound(request("r1")).unwrap();
    assert!(pending.cancel("r1"));
    assert!(!pending.cancel("r1"));
    assert_eq!(pending.outbound_len(), 0);
    assert!(pending.resolve_outbound("r1").is_none());
}

#[test]
fn test_inbound_first_copy_wins_and_counts() {
    let mut pending = PendingRequests::new();
    pending.insert_outbound(request("mine")).unwrap();
    assert!(pending.record_inbound(inbound("theirs")));
    let mut again = inbound("theirs");
    again.event_id = "other".into();
    assert!(!pending.record_inbound(again));

    assert_eq!(pending.len(), 2);
    assert_eq!(pending.inbound("theirs").unwrap().event_id, "ev-theirs");
    assert_eq!(pending.take_inbound("theirs").unwrap().request.request_id, "theirs");
    assert!(matches!(
        pending.take_inbound("theirs"),
        Err(StateError::UnknownRequest(_))
    ));
}

// ─── Inbound expiry ──────────────────────────────────────────────────────────

fn inbound_at(id: &str, secs: i64) -> InboundRequest {
    InboundRequest {
        received_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        ..inbound(id)
    }
}

#[test]
fn test_unanswered_inbound_expires_after_max_age() {
    let mut pending = PendingRequests::new();
    pending.insert_outbound(request("mine")).unwrap();
    pending.record_inbound(inbound_at("old", 0));
    pending.record_inbound(inbound_at("fresh", 500));
    let now = Utc.timestamp_opt(1_700_000_600, 0).unwrap();
    let max_age = Duration::from_secs(600);

    assert!(pending.expire_inbound(now, max_age).is_empty(), "exactly at max age is kept");
    let later = now + chrono::Duration::seconds(1);
    assert_eq!(pending.expire_inbound(later, max_age), vec!["old".to_string()]);
    assert!(pending.inbound("old").is_none());
    assert!(pending.inbound("fresh").is_some());
    assert_eq!(pending.inbound_len(), 1);
    assert_eq!(pending.outbound_len(), 1, "outbound entries are never expired");
    assert_eq!(pending.len(), 2);
}

#[test]
fn test_inbound_past_deadline_expires_early() {
    let mut pending = PendingRequests::new();
    let mut held = inbound_at("hurry", 0);
    held.request.deadline = Some(Utc.timestamp_opt(1_700_000_010, 0).unwrap());
    pending.record_inbound(held);
    pending.record_inbound(inbound_at("patient", 0));

    let now = Utc.timestamp_opt(1_700_000_011, 0).unwrap();
    let expired = pending.expire_inbound(now, Duration::from_secs(600));
    assert_eq!(expired, vec!["hurry".to_string()]);
    assert!(matches!(
        pending.take_inbound("hurry"),
        Err(StateError::UnknownRequest(_))
    ));
    assert!(pending.take_inbound("patient").is_ok());
}
