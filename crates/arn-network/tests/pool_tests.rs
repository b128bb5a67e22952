//! Relay pool behaviour over simulated relays.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arn_network::*;
use arn_protocol::{Event, EventKind, Filter, Identity, UnsignedEvent};
use futures::future::BoxFuture;
use tokio::time::timeout;

const URLS: [&str; 3] = ["sim://alpha", "sim://beta", "sim://gamma"];

async fn connected_pool(net: &SimulatedRelayNetwork) -> RelayPool {
    let pool = RelayPool::new(net.transports(&URLS));
    assert_eq!(pool.connect_all().await, 3);
    pool
}

fn discovery_event(identity: &Identity) -> Event {
    UnsignedEvent::new(EventKind::AgentDiscovery, "{}".into())
        .sign(identity)
        .unwrap()
}

async fn next(sub: &mut PoolSubscription) -> PoolEvent {
    timeout(Duration::from_secs(2), sub.events.recv())
        .await
        .expect("pool event within 2s")
        .expect("subscription open")
}

// ─── Fan-out and dedup ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_event_via_three_relays_delivered_once() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    let mut sub = pool
        .subscribe(vec![Filter::new().kind(EventKind::AgentDiscovery)])
        .await;
    assert!(matches!(next(&mut sub).await, PoolEvent::EndOfStored));

    let event = discovery_event(&Identity::generate());
    assert_eq!(pool.publish(&event).await.unwrap(), 3);

    match next(&mut sub).await {
        PoolEvent::Event { event: got, .. } => assert_eq!(got.id, event.id),
        other => panic!("expected event, got {other:?}"),
    }
    let extra = timeout(Duration::from_millis(200), sub.events.recv()).await;
    assert!(extra.is_err(), "duplicate copies must be suppressed");

    for url in URLS {
        assert_eq!(net.relay(url).stored_events().len(), 1);
    }
}

#[tokio::test]
async fn test_stored_events_replayed_before_end_of_stored() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    let event = discovery_event(&Identity::generate());
    pool.publish(&event).await.unwrap();

    let mut sub = pool
        .subscribe(vec![Filter::new().kind(EventKind::AgentDiscovery)])
        .await;
    match next(&mut sub).await {
        PoolEvent::Event { event: got, .. } => assert_eq!(got.id, event.id),
        other => panic!("expected replayed event, got {other:?}"),
    }
    assert!(matches!(next(&mut sub).await, PoolEvent::EndOfStored));
}

#[tokio::test]
async fn test_non_matching_events_not_delivered() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    let mut sub = pool
        .subscribe(vec![Filter::new().kind(EventKind::AgentResponse)])
        .await;
    assert!(matches!(next(&mut sub).await, PoolEvent::EndOfStored));

    pool.publish(&discovery_event(&Identity::generate())).await.unwrap();
    let nothing = timeout(Duration::from_millis(200), sub.events.recv()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_addressable_event_replaced_on_relay() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    let identity = Identity::generate();
    let first = UnsignedEvent::new(EventKind::AgentAnnouncement, "{\"v\":1}".into())
        .created_at(1_000)
        .tag("d", "agent-a")
        .sign(&identity)
        .unwrap();
    let second = UnsignedEvent::new(EventKind::AgentAnnouncement, "{\"v\":2}".into())
        .created_at(2_000)
        .tag("d", "agent-a")
        .sign(&identity)
        .unwrap();
    pool.publish(&first).await.unwrap();
    pool.publish(&second).await.unwrap();

    let stored = net.relay("sim://alpha").stored_events();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, second.id);
}

// ─── Failure semantics ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_survives_one_relay_down() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    net.relay("sim://beta").set_online(false);

    let accepted = pool.publish(&discovery_event(&Identity::generate())).await.unwrap();
    assert_eq!(accepted, 2);
}

#[tokio::test]
async fn test_publish_fails_when_every_relay_down() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    for url in URLS {
        net.relay(url).set_online(false);
    }
    let err = pool
        .publish(&discovery_event(&Identity::generate()))
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::AllRelaysUnreachable { attempted: 3 }));
}

#[tokio::test]
async fn test_end_of_stored_when_no_relay_connected() {
    let net = SimulatedRelayNetwork::new();
    net.relay("sim://alpha").set_online(false);
    let pool = RelayPool::new(net.transports(&["sim://alpha"]));
    assert_eq!(pool.connect_all().await, 0);

    let mut sub = pool.subscribe(vec![Filter::new()]).await;
    assert!(matches!(next(&mut sub).await, PoolEvent::EndOfStored));
}

// ─── Health monitor ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_probe_marks_down_then_recovers() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    let monitor = pool.health_monitor();
    let counts = HashMap::from([("sim://alpha".to_string(), 2usize)]);

    assert_eq!(monitor.probe_all(&counts).await, 3);
    net.relay("sim://beta").set_online(false);
    assert_eq!(monitor.probe_all(&counts).await, 2);

    {
        let board = pool.board();
        let board = board.read().await;
        let beta = board.get("sim://beta").unwrap();
        assert!(!beta.connected);
        assert_eq!(beta.latency_ms, -1);
        assert!(beta.last_ping.is_some());
        assert_eq!(board.get("sim://alpha").unwrap().agent_count, 2);
    }

    // publishes keep working through the healthy relays
    assert_eq!(
        pool.publish(&discovery_event(&Identity::generate())).await.unwrap(),
        2
    );

    net.relay("sim://beta").set_online(true);
    assert_eq!(monitor.probe_all(&counts).await, 3);
    let board = pool.board();
    assert!(board.read().await.get("sim://beta").unwrap().connected);
    assert_eq!(net.relay("sim://beta").session_count(), 1);
}

#[tokio::test]
async fn test_reconnect_replays_subscriptions() {
    let net = SimulatedRelayNetwork::new();
    let pool = connected_pool(&net).await;
    let monitor = pool.health_monitor();
    let mut sub = pool
        .subscribe(vec![Filter::new().kind(EventKind::AgentDiscovery)])
        .await;
    assert!(matches!(next(&mut sub).await, PoolEvent::EndOfStored));

    for url in URLS {
        net.relay(url).set_online(false);
    }
    monitor.probe_all(&HashMap::new()).await;
    net.relay("sim://gamma").set_online(true);
    assert_eq!(monitor.probe_all(&HashMap::new()).await, 1);

    let event = discovery_event(&Identity::generate());
    assert_eq!(pool.publish(&event).await.unwrap(), 1);
    match next(&mut sub).await {
        PoolEvent::Event { relay_url, event: got } => {
            assert_eq!(relay_url, "sim://gamma");
            assert_eq!(got.id, event.id);
        }
        other => panic!("expected live event after reconnect, got {other:?}"),
    }
}

// ─── Malformed inbound events ────────────────────────────────────────────────

/// Transport that answers every subscription with a scripted batch.
struct ScriptedTransport {
    script: Vec<Event>,
    frames: Mutex<Option<FrameSender>>,
}

impl RelayTransport for ScriptedTransport {
    fn url(&self) -> &str {
        "scripted://relay"
    }

    fn is_connected(&self) -> bool {
        self.frames.lock().unwrap().is_some()
    }

    fn connect(&self, frames: FrameSender) -> BoxFuture<'_, Result<(), NetworkError>> {
        *self.frames.lock().unwrap() = Some(frames);
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        *self.frames.lock().unwrap() = None;
        Box::pin(async {})
    }

    fn publish<'a>(&'a self, _event: &'a Event) -> BoxFuture<'a, Result<(), NetworkError>> {
        Box::pin(async { Ok(()) })
    }

    fn subscribe<'a>(
        &'a self,
        subscription_id: &'a str,
        _filters: &'a [Filter],
    ) -> BoxFuture<'a, Result<(), NetworkError>> {
        let frames = self.frames.lock().unwrap().clone();
        Box::pin(async move {
            let frames = frames.ok_or_else(|| NetworkError::NotConnected(self.url().into()))?;
            for event in &self.script {
                let _ = frames.send(RelayFrame::Event {
                    relay_url: self.url().into(),
                    subscription_id: subscription_id.into(),
                    event: event.clone(),
                });
            }
            let _ = frames.send(RelayFrame::EndOfStored {
                relay_url: self.url().into(),
                subscription_id: subscription_id.into(),
            });
            Ok(())
        })
    }

    fn unsubscribe<'a>(&'a self, _subscription_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn ping(&self) -> BoxFuture<'_, Result<Duration, NetworkError>> {
        Box::pin(async { Ok(Duration::ZERO) })
    }
}

#[tokio::test]
async fn test_forged_events_dropped_by_dispatcher() {
    let identity = Identity::generate();
    let genuine = discovery_event(&identity);
    let mut forged = discovery_event(&identity);
    forged.content = "{\"tampered\":true}".into();

    let transport = ScriptedTransport {
        script: vec![forged, genuine.clone()],
        frames: Mutex::new(None),
    };
    let pool = RelayPool::new(vec![Arc::new(transport) as Arc<dyn RelayTransport>]);
    pool.connect_all().await;

    let mut sub = pool.subscribe(vec![Filter::new()]).await;
    match next(&mut sub).await {
        PoolEvent::Event { event, .. } => assert_eq!(event.id, genuine.id),
        other => panic!("expected genuine event, got {other:?}"),
    }
    assert!(matches!(next(&mut sub).await, PoolEvent::EndOfStored));
}
