//! Fan-out publishing and multiplexed subscriptions over many relays.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use arn_protocol::{Event, Filter};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::dedup::SeenEvents;
use crate::health::{RelayHealthMonitor, RelayStatusBoard};
use crate::transport::{RelayFrame, RelayTransport};
use crate::NetworkError;

/// Default buffer of each subscription's event channel.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// First copy of a verified event matching the subscription.
    Event { relay_url: String, event: Event },
    /// Every relay holding the subscription has replayed its stored events
    /// (or dropped the connection). Sent at most once.
    EndOfStored,
}

pub struct PoolSubscription {
    pub id: String,
    pub events: mpsc::Receiver<PoolEvent>,
}

struct SubscriptionSlot {
    tx: mpsc::Sender<PoolEvent>,
    seen: SeenEvents,
    awaiting_eose: HashSet<String>,
    eose_sent: bool,
}

impl SubscriptionSlot {
    /// Stop waiting on `relay_url`; returns the sender when this completes
    /// end-of-stored for the subscription.
    fn settle(&mut self, relay_url: &str) -> Option<mpsc::Sender<PoolEvent>> {
        self.awaiting_eose.remove(relay_url);
        self.finish_if_settled()
    }

    fn finish_if_settled(&mut self) -> Option<mpsc::Sender<PoolEvent>> {
        if self.awaiting_eose.is_empty() && !self.eose_sent {
            self.eose_sent = true;
            Some(self.tx.clone())
        } else {
            None
        }
    }
}

type Slots = Arc<Mutex<HashMap<String, SubscriptionSlot>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A set of relay connections used as one redundant channel.
pub struct RelayPool {
    relays: Vec<Arc<dyn RelayTransport>>,
    board: Arc<RwLock<RelayStatusBoard>>,
    subscriptions: Slots,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl RelayPool {
    pub fn new(relays: Vec<Arc<dyn RelayTransport>>) -> Self {
        let urls: Vec<String> = relays.iter().map(|r| r.url().to_string()).collect();
        Self {
            relays,
            board: Arc::new(RwLock::new(RelayStatusBoard::new(&urls))),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn relays(&self) -> &[Arc<dyn RelayTransport>] {
        &self.relays
    }

    pub fn relay_urls(&self) -> Vec<String> {
        self.relays.iter().map(|r| r.url().to_string()).collect()
    }

    pub fn board(&self) -> Arc<RwLock<RelayStatusBoard>> {
        self.board.clone()
    }

    pub fn health_monitor(&self) -> RelayHealthMonitor {
        RelayHealthMonitor::new(self.relays.clone(), self.board.clone())
    }

    pub fn connected_count(&self) -> usize {
        self.relays.iter().filter(|r| r.is_connected()).count()
    }

    /// Connect every relay concurrently and start the inbound dispatcher.
    /// Returns how many relays connected; failures are logged, not fatal.
    pub async fn connect_all(&self) -> usize {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        {
            let mut dispatcher = lock(&self.dispatcher);
            if let Some(old) = dispatcher.take() {
                old.abort();
            }
            *dispatcher = Some(tokio::spawn(dispatch(frames_rx, self.subscriptions.clone())));
        }

        let attempts = self.relays.iter().map(|relay| {
            let frames = frames_tx.clone();
            async move { (relay.url().to_string(), relay.connect(frames).await) }
        });
        let results = futures::future::join_all(attempts).await;

        let mut connected = 0;
        for (url, result) in results {
            match result {
                Ok(()) => connected += 1,
                Err(e) => tracing::warn!(relay = %url, error = %e, "Relay unreachable"),
            }
        }
        tracing::info!(connected, total = self.relays.len(), "Relay pool connected");
        connected
    }

    /// Close every subscription and relay connection.
    pub async fn disconnect_all(&self) {
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
        lock(&self.subscriptions).clear();
        futures::future::join_all(self.relays.iter().map(|r| r.disconnect())).await;
    }

    /// Publish to every connected relay not marked unhealthy.
    ///
    /// Succeeds with the number of accepting relays when at least one
    /// accepted; individual failures are logged.
    pub async fn publish(&self, event: &Event) -> Result<usize, NetworkError> {
        let candidates: Vec<Arc<dyn RelayTransport>> = {
            let board = self.board.read().await;
            self.relays
                .iter()
                .filter(|r| r.is_connected() && !board.is_excluded(r.url()))
                .cloned()
                .collect()
        };

        let results =
            futures::future::join_all(candidates.iter().map(|relay| relay.publish(event))).await;

        let mut accepted = 0;
        for (relay, result) in candidates.iter().zip(results) {
            match result {
                Ok(()) => accepted += 1,
                Err(e) => {
                    tracing::warn!(relay = %relay.url(), event_id = %event.id, error = %e, "Relay unreachable")
                }
            }
        }

        if accepted == 0 {
            return Err(NetworkError::AllRelaysUnreachable {
                attempted: self.relays.len(),
            });
        }
        tracing::debug!(event_id = %event.id, kind = event.kind, accepted, "Published event");
        Ok(accepted)
    }

    /// Subscribe on every relay. Relays that are down remember the
    /// subscription and replay it when they reconnect.
    pub async fn subscribe(&self, filters: Vec<Filter>) -> PoolSubscription {
        let id = format!("arn-{}", uuid::Uuid::new_v4().simple());
        let (tx, rx) = mpsc::channel(DEFAULT_SUBSCRIPTION_CAPACITY);

        let awaiting_eose = self
            .relays
            .iter()
            .filter(|r| r.is_connected())
            .map(|r| r.url().to_string())
            .collect();
        lock(&self.subscriptions).insert(
            id.clone(),
            SubscriptionSlot {
                tx,
                seen: SeenEvents::default(),
                awaiting_eose,
                eose_sent: false,
            },
        );

        let results =
            futures::future::join_all(self.relays.iter().map(|r| r.subscribe(&id, &filters))).await;

        let finished = {
            let mut slots = lock(&self.subscriptions);
            slots.get_mut(&id).and_then(|slot| {
                for (relay, result) in self.relays.iter().zip(&results) {
                    if let Err(e) = result {
                        tracing::debug!(relay = %relay.url(), subscription = %id, error = %e, "Subscription deferred until reconnect");
                        slot.awaiting_eose.remove(relay.url());
                    }
                }
                slot.finish_if_settled()
            })
        };
        if let Some(tx) = finished {
            // The receiver is not handed out yet, so never block here.
            tokio::spawn(async move {
                let _ = tx.send(PoolEvent::EndOfStored).await;
            });
        }

        PoolSubscription { id, events: rx }
    }

    pub async fn unsubscribe(&self, subscription_id: &str) {
        lock(&self.subscriptions).remove(subscription_id);
        futures::future::join_all(self.relays.iter().map(|r| r.unsubscribe(subscription_id))).await;
    }
}

impl Drop for RelayPool {
    fn drop(&mut self) {
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
    }
}

/// Route relay frames to subscriptions: verify, dedup per subscription,
/// and track end-of-stored-events.
async fn dispatch(mut frames: mpsc::UnboundedReceiver<RelayFrame>, slots: Slots) {
    while let Some(frame) = frames.recv().await {
        let deliveries: Vec<(String, mpsc::Sender<PoolEvent>, PoolEvent)> = match frame {
            RelayFrame::Event {
                relay_url,
                subscription_id,
                event,
            } => {
                if let Err(e) = event.verify() {
                    tracing::warn!(relay = %relay_url, event_id = %event.id, error = %e, "Dropping malformed event");
                    continue;
                }
                let mut slots = lock(&slots);
                let Some(slot) = slots.get_mut(&subscription_id) else {
                    continue;
                };
                if !slot.seen.check_and_insert(&event.id) {
                    tracing::trace!(relay = %relay_url, event_id = %event.id, "Duplicate event");
                    continue;
                }
                vec![(
                    subscription_id,
                    slot.tx.clone(),
                    PoolEvent::Event { relay_url, event },
                )]
            }
            RelayFrame::EndOfStored {
                relay_url,
                subscription_id,
            } => {
                let mut slots = lock(&slots);
                slots
                    .get_mut(&subscription_id)
                    .and_then(|slot| slot.settle(&relay_url))
                    .map(|tx| (subscription_id, tx, PoolEvent::EndOfStored))
                    .into_iter()
                    .collect()
            }
            RelayFrame::Disconnected { relay_url } => {
                tracing::debug!(relay = %relay_url, "Relay disconnected");
                let mut slots = lock(&slots);
                slots
                    .iter_mut()
                    .filter_map(|(id, slot)| {
                        slot.settle(&relay_url)
                            .map(|tx| (id.clone(), tx, PoolEvent::EndOfStored))
                    })
                    .collect()
            }
        };

        for (subscription_id, tx, event) in deliveries {
            if tx.send(event).await.is_err() {
                lock(&slots).remove(&subscription_id);
            }
        }
    }
}
