use arn_protocol::*;

fn price_agent() -> AgentAdvertisement {
    AgentAdvertisement::new(
        "price-analysis-agent",
        "Price Analysis",
        "$0.01".parse().unwrap(),
    )
    .with_capability("technical_analysis")
    .with_reputation(0.9)
}

#[test]
fn test_announcement_carries_identifier_and_capabilities() {
    let identity = Identity::generate();
    let ad = price_agent();
    let event = UnsignedEvent::with_json(EventKind::AgentAnnouncement, &ad)
        .unwrap()
        .tag(TAG_IDENTIFIER, ad.agent_id.clone())
        .tag(TAG_CAPABILITY, "technical_analysis")
        .sign(&identity)
        .unwrap();

    assert!(event.verify().is_ok());
    assert_eq!(event.identifier(), Some("price-analysis-agent"));
    assert!(event.recipients().is_empty());
    assert!(Filter::new()
        .kind(EventKind::AgentAnnouncement)
        .capabilities(["technical_analysis"])
        .matches(&event));

    let decoded: AgentAdvertisement = event.parse_content(EventKind::AgentAnnouncement).unwrap();
    assert_eq!(decoded, ad);
}

#[test]
fn test_directed_request_tags_every_recipient() {
    let requester = Identity::generate();
    let a = Identity::generate();
    let b = Identity::generate();
    let request = AgentRequest {
        request_id: "r1".into(),
        task_type: "technical_analysis".into(),
        payload: serde_json::json!({"symbol": "AAPL"}),
        requester_pubkey: requester.public_key().clone(),
        target_agent: None,
        max_cost: None,
        deadline: None,
        relays: vec![],
    };
    let event = UnsignedEvent::with_json(EventKind::AgentRequest, &request)
        .unwrap()
        .recipient(a.public_key())
        .recipient(b.public_key())
        .tag(TAG_REQUEST, "r1")
        .sign(&requester)
        .unwrap();

    assert_eq!(event.recipients(), vec![a.public_key().clone(), b.public_key().clone()]);
    assert!(event.is_addressed_to(a.public_key()));
    assert!(!event.is_addressed_to(requester.public_key()));
    assert_eq!(event.first_tag(TAG_REQUEST), Some("r1"));
}

#[test]
fn test_event_survives_json_transport() {
    let identity = Identity::generate();
    let event = UnsignedEvent::new(EventKind::TaskCoordination, "{}".into())
        .recipient(identity.public_key())
        .sign(&identity)
        .unwrap();
    let wire = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&wire).unwrap();
    assert_eq!(back, event);
    assert!(back.verify().is_ok());
}

#[test]
fn test_garbage_content_is_malformed() {
    let identity = Identity::generate();
    let event = UnsignedEvent::new(EventKind::AgentResponse, "not json".into())
        .sign(&identity)
        .unwrap();
    let parsed: Result<AgentResponse, _> = event.parse_content(EventKind::AgentResponse);
    assert!(matches!(parsed, Err(ProtocolError::MalformedContent { .. })));
}
