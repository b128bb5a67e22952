//! In-memory relays for tests and demos.
//!
//! A [`SimulatedRelay`] behaves like a small relay server: it verifies
//! signatures, stores events (keeping only the newest addressable event per
//! author, kind and `d` tag), replays stored matches to new subscriptions
//! followed by end-of-stored-events, and fans live events out to matching
//! subscriptions. Taking it offline drops every client session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use arn_protocol::event::{is_addressable_kind, is_ephemeral_kind};
use arn_protocol::{Event, Filter};
use futures::future::BoxFuture;

use crate::transport::{FrameSender, RelayFrame, RelayTransport};
use crate::NetworkError;

struct Session {
    frames: FrameSender,
    connected: Arc<AtomicBool>,
    subscriptions: HashMap<String, Vec<Filter>>,
}

struct RelayState {
    online: bool,
    latency: Duration,
    stored: Vec<Event>,
    sessions: HashMap<u64, Session>,
    next_session: u64,
}

pub struct SimulatedRelay {
    url: String,
    state: Mutex<RelayState>,
}

impl SimulatedRelay {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            state: Mutex::new(RelayState {
                online: true,
                latency: Duration::ZERO,
                stored: Vec::new(),
                sessions: HashMap::new(),
                next_session: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Taking a relay offline drops every client session.
    pub fn set_online(&self, online: bool) {
        let mut state = self.lock();
        state.online = online;
        if !online {
            for (_, session) in state.sessions.drain() {
                session.connected.store(false, Ordering::SeqCst);
                let _ = session.frames.send(RelayFrame::Disconnected {
                    relay_url: self.url.clone(),
                });
            }
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn latency(&self) -> Duration {
        self.lock().latency
    }

    pub fn stored_events(&self) -> Vec<Event> {
        self.lock().stored.clone()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    fn ensure_live(&self, state: &RelayState, session: u64) -> Result<(), NetworkError> {
        if !state.online {
            return Err(NetworkError::unreachable(&self.url, "relay offline"));
        }
        if !state.sessions.contains_key(&session) {
            return Err(NetworkError::NotConnected(self.url.clone()));
        }
        Ok(())
    }

    fn open_session(&self, frames: FrameSender, connected: Arc<AtomicBool>) -> Result<u64, NetworkError> {
        let mut state = self.lock();
        if !state.online {
            return Err(NetworkError::unreachable(&self.url, "connection refused"));
        }
        let id = state.next_session;
        state.next_session += 1;
        connected.store(true, Ordering::SeqCst);
        state.sessions.insert(
            id,
            Session {
                frames,
                connected,
                subscriptions: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn close_session(&self, session: u64) {
        if let Some(s) = self.lock().sessions.remove(&session) {
            s.connected.store(false, Ordering::SeqCst);
        }
    }

    fn accept(&self, session: u64, event: &Event) -> Result<(), NetworkError> {
        let mut state = self.lock();
        self.ensure_live(&state, session)?;
        event.verify().map_err(|e| NetworkError::Rejected {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        if state.stored.iter().any(|stored| stored.id == event.id) {
            return Ok(());
        }

        if !is_ephemeral_kind(event.kind) {
            if is_addressable_kind(event.kind) {
                let d = event.identifier().unwrap_or_default();
                let existing = state.stored.iter().position(|stored| {
                    stored.kind == event.kind
                        && stored.pubkey == event.pubkey
                        && stored.identifier().unwrap_or_default() == d
                });
                if let Some(pos) = existing {
                    if state.stored[pos].created_at > event.created_at {
                        return Ok(());
                    }
                    state.stored.remove(pos);
                }
            }
            state.stored.push(event.clone());
        }

        for client in state.sessions.values() {
            for (subscription_id, filters) in &client.subscriptions {
                if filters.iter().any(|f| f.matches(event)) {
                    let _ = client.frames.send(RelayFrame::Event {
                        relay_url: self.url.clone(),
                        subscription_id: subscription_id.clone(),
                        event: event.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn open_subscription(&self, session: u64, subscription_id: &str, filters: &[Filter]) -> Result<(), NetworkError> {
        let mut state = self.lock();
        self.ensure_live(&state, session)?;

        let mut replay: Vec<Event> = Vec::new();
        for filter in filters {
            let mut matched: Vec<&Event> = state.stored.iter().filter(|e| filter.matches(e)).collect();
            matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = filter.limit {
                matched.truncate(limit);
            }
            for event in matched {
                if !replay.iter().any(|r| r.id == event.id) {
                    replay.push(event.clone());
                }
            }
        }
        replay.sort_by_key(|e| e.created_at);

        let Some(s) = state.sessions.get_mut(&session) else {
            return Err(NetworkError::NotConnected(self.url.clone()));
        };
        s.subscriptions
            .insert(subscription_id.to_string(), filters.to_vec());
        for event in replay {
            let _ = s.frames.send(RelayFrame::Event {
                relay_url: self.url.clone(),
                subscription_id: subscription_id.to_string(),
                event,
            });
        }
        let _ = s.frames.send(RelayFrame::EndOfStored {
            relay_url: self.url.clone(),
            subscription_id: subscription_id.to_string(),
        });
        Ok(())
    }

    fn close_subscription(&self, session: u64, subscription_id: &str) {
        if let Some(s) = self.lock().sessions.get_mut(&session) {
            s.subscriptions.remove(subscription_id);
        }
    }

    fn ping(&self, session: u64) -> Result<(), NetworkError> {
        let state = self.lock();
        self.ensure_live(&state, session)
    }
}

#[derive(Default)]
struct Link {
    session: Option<u64>,
    frames: Option<FrameSender>,
    subscriptions: HashMap<String, Vec<Filter>>,
}

/// A client connection to a [`SimulatedRelay`].
pub struct SimulatedRelayTransport {
    relay: Arc<SimulatedRelay>,
    connected: Arc<AtomicBool>,
    link: Mutex<Link>,
}

impl SimulatedRelayTransport {
    pub fn new(relay: Arc<SimulatedRelay>) -> Self {
        Self {
            relay,
            connected: Arc::new(AtomicBool::new(false)),
            link: Mutex::new(Link::default()),
        }
    }

    pub fn relay(&self) -> &Arc<SimulatedRelay> {
        &self.relay
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a fresh session and replay remembered subscriptions.
    fn open(&self, link: &mut Link) -> Result<(), NetworkError> {
        if let Some(old) = link.session.take() {
            self.relay.close_session(old);
        }
        let frames = link
            .frames
            .clone()
            .ok_or_else(|| NetworkError::NotConnected(self.relay.url.clone()))?;
        let session = self.relay.open_session(frames, self.connected.clone())?;
        link.session = Some(session);
        for (subscription_id, filters) in &link.subscriptions {
            self.relay
                .open_subscription(session, subscription_id, filters)?;
        }
        Ok(())
    }

    fn live_session(&self) -> Result<u64, NetworkError> {
        match self.lock().session {
            Some(session) if self.is_connected() => Ok(session),
            _ => Err(NetworkError::NotConnected(self.relay.url.clone())),
        }
    }
}

impl RelayTransport for SimulatedRelayTransport {
    fn url(&self) -> &str {
        &self.relay.url
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self, frames: FrameSender) -> BoxFuture<'_, Result<(), NetworkError>> {
        Box::pin(async move {
            tokio::time::sleep(self.relay.latency()).await;
            let mut link = self.lock();
            link.frames = Some(frames);
            self.open(&mut link)
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut link = self.lock();
            if let Some(session) = link.session.take() {
                self.relay.close_session(session);
            }
            self.connected.store(false, Ordering::SeqCst);
            link.frames = None;
            link.subscriptions.clear();
        })
    }

    fn publish<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), NetworkError>> {
        Box::pin(async move {
            self.live_session()?;
            tokio::time::sleep(self.relay.latency()).await;
            let session = self.live_session()?;
            self.relay.accept(session, event)
        })
    }

    fn subscribe<'a>(
        &'a self,
        subscription_id: &'a str,
        filters: &'a [Filter],
    ) -> BoxFuture<'a, Result<(), NetworkError>> {
        Box::pin(async move {
            let mut link = self.lock();
            link.subscriptions
                .insert(subscription_id.to_string(), filters.to_vec());
            match link.session {
                Some(session) if self.is_connected() => {
                    self.relay
                        .open_subscription(session, subscription_id, filters)
                }
                _ => Err(NetworkError::NotConnected(self.relay.url.clone())),
            }
        })
    }

    fn unsubscribe<'a>(&'a self, subscription_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut link = self.lock();
            link.subscriptions.remove(subscription_id);
            if let Some(session) = link.session {
                self.relay.close_subscription(session, subscription_id);
            }
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<Duration, NetworkError>> {
        Box::pin(async move {
            let started = Instant::now();
            if !self.is_connected() {
                let mut link = self.lock();
                self.open(&mut link)?;
            }
            tokio::time::sleep(self.relay.latency()).await;
            let session = self.live_session()?;
            self.relay.ping(session)?;
            Ok(started.elapsed())
        })
    }
}

/// A set of named simulated relays shared by several nodes.
#[derive(Clone, Default)]
pub struct SimulatedRelayNetwork {
    relays: Arc<Mutex<HashMap<String, Arc<SimulatedRelay>>>>,
}

impl SimulatedRelayNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// The relay at `url`, created on first use.
    pub fn relay(&self, url: &str) -> Arc<SimulatedRelay> {
        let mut relays = self
            .relays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        relays
            .entry(url.to_string())
            .or_insert_with(|| SimulatedRelay::new(url))
            .clone()
    }

    /// One fresh client transport per url.
    pub fn transports<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Arc<dyn RelayTransport>> {
        urls.iter()
            .map(|url| {
                Arc::new(SimulatedRelayTransport::new(self.relay(url.as_ref()))) as Arc<dyn RelayTransport>
            })
            .collect()
    }
}
