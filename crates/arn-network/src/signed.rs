//! Websocket relay transport speaking the JSON frame protocol in
//! [`crate::message`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use arn_protocol::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PUBLISH_TIMEOUT_SECS};
use arn_protocol::{Event, Filter};
use futures::future::BoxFuture;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::message::{ClientMessage, RelayMessage};
use crate::transport::{FrameSender, RelayFrame, RelayTransport};
use crate::NetworkError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct SignedRelayConfig {
    pub connect_timeout: Duration,
    /// How long to wait for the relay's `OK` after publishing.
    pub publish_timeout: Duration,
    pub ping_timeout: Duration,
}

impl Default for SignedRelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            ping_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
        }
    }
}

/// Waiters resolved by the reader task.
#[derive(Default)]
struct Waiters {
    /// event id → publish acknowledgement
    acks: HashMap<String, oneshot::Sender<(bool, String)>>,
    /// ping payload → probe waiting for the matching pong
    pongs: HashMap<Vec<u8>, oneshot::Sender<()>>,
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

#[derive(Default)]
struct Link {
    connection: Option<Connection>,
    frames: Option<FrameSender>,
    subscriptions: HashMap<String, Vec<Filter>>,
}

/// A websocket connection to one relay.
pub struct SignedRelayTransport {
    url: String,
    config: SignedRelayConfig,
    connected: Arc<AtomicBool>,
    link: Mutex<Link>,
    waiters: Arc<Mutex<Waiters>>,
    next_ping: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SignedRelayTransport {
    pub fn new(url: impl Into<String>, config: SignedRelayConfig) -> Self {
        Self {
            url: url.into(),
            config,
            connected: Arc::new(AtomicBool::new(false)),
            link: Mutex::new(Link::default()),
            waiters: Arc::new(Mutex::new(Waiters::default())),
            next_ping: AtomicU64::new(0),
        }
    }

    async fn open(&self) -> Result<(), NetworkError> {
        let frames = lock(&self.link)
            .frames
            .clone()
            .ok_or_else(|| NetworkError::NotConnected(self.url.clone()))?;

        let (stream, _) = timeout(self.config.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                NetworkError::unreachable(
                    &self.url,
                    format!("connect timed out after {:?}", self.config.connect_timeout),
                )
            })?
            .map_err(|e| NetworkError::unreachable(&self.url, e))?;

        let (mut sink, source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        self.connected.store(true, Ordering::SeqCst);
        let reader = tokio::spawn(read_loop(
            self.url.clone(),
            source,
            outbound.clone(),
            frames,
            self.waiters.clone(),
            self.connected.clone(),
        ));

        let mut link = lock(&self.link);
        for (subscription_id, filters) in &link.subscriptions {
            let req = ClientMessage::Req {
                subscription_id: subscription_id.clone(),
                filters: filters.clone(),
            };
            match req.to_json() {
                Ok(text) => {
                    let _ = outbound.send(Message::Text(text.into()));
                }
                Err(e) => {
                    tracing::warn!(relay = %self.url, subscription = %subscription_id, error = %e, "Skipping subscription replay");
                }
            }
        }
        if let Some(old) = link.connection.replace(Connection { outbound, reader }) {
            old.reader.abort();
        }
        tracing::info!(relay = %self.url, "Connected to relay");
        Ok(())
    }

    fn outbound(&self) -> Result<mpsc::UnboundedSender<Message>, NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected(self.url.clone()));
        }
        lock(&self.link)
            .connection
            .as_ref()
            .map(|c| c.outbound.clone())
            .ok_or_else(|| NetworkError::NotConnected(self.url.clone()))
    }

    fn send(&self, message: ClientMessage) -> Result<(), NetworkError> {
        let text = message.to_json()?;
        self.outbound()?
            .send(Message::Text(text.into()))
            .map_err(|_| NetworkError::Transport(format!("{}: writer stopped", self.url)))
    }
}

async fn read_loop(
    url: String,
    mut source: SplitStream<WsStream>,
    outbound: mpsc::UnboundedSender<Message>,
    frames: FrameSender,
    waiters: Arc<Mutex<Waiters>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => match RelayMessage::parse(text.as_str()) {
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                }) => {
                    let _ = frames.send(RelayFrame::Event {
                        relay_url: url.clone(),
                        subscription_id,
                        event,
                    });
                }
                Ok(RelayMessage::Eose(subscription_id)) => {
                    let _ = frames.send(RelayFrame::EndOfStored {
                        relay_url: url.clone(),
                        subscription_id,
                    });
                }
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                }) => {
                    if let Some(tx) = lock(&waiters).acks.remove(&event_id) {
                        let _ = tx.send((accepted, message));
                    }
                }
                Ok(RelayMessage::Closed {
                    subscription_id,
                    message,
                }) => {
                    tracing::debug!(relay = %url, subscription = %subscription_id, %message, "Relay closed subscription");
                }
                Ok(RelayMessage::Notice(notice)) => {
                    tracing::debug!(relay = %url, %notice, "Relay notice");
                }
                Err(e) => {
                    tracing::warn!(relay = %url, error = %e, "Ignoring malformed relay frame");
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = outbound.send(Message::Pong(data));
            }
            Ok(Message::Pong(data)) => {
                if let Some(tx) = lock(&waiters).pongs.remove(&data[..]) {
                    let _ = tx.send(());
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(relay = %url, error = %e, "Relay connection error");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    {
        let mut waiters = lock(&waiters);
        waiters.acks.clear();
        waiters.pongs.clear();
    }
    tracing::info!(relay = %url, "Relay connection closed");
    let _ = frames.send(RelayFrame::Disconnected { relay_url: url });
}

impl RelayTransport for SignedRelayTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self, frames: FrameSender) -> BoxFuture<'_, Result<(), NetworkError>> {
        Box::pin(async move {
            lock(&self.link).frames = Some(frames);
            self.open().await
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let connection = {
                let mut link = lock(&self.link);
                link.frames = None;
                link.subscriptions.clear();
                link.connection.take()
            };
            self.connected.store(false, Ordering::SeqCst);
            if let Some(connection) = connection {
                // The writer exits once the reader's sender and ours are gone.
                let _ = connection.outbound.send(Message::Close(None));
                connection.reader.abort();
            }
        })
    }

    fn publish<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), NetworkError>> {
        Box::pin(async move {
            let frame = ClientMessage::Event(event.clone()).to_json()?;
            let outbound = self.outbound()?;

            let (tx, rx) = oneshot::channel();
            lock(&self.waiters).acks.insert(event.id.clone(), tx);
            if outbound.send(Message::Text(frame.into())).is_err() {
                lock(&self.waiters).acks.remove(&event.id);
                return Err(NetworkError::NotConnected(self.url.clone()));
            }

            match timeout(self.config.publish_timeout, rx).await {
                Ok(Ok((true, _))) => Ok(()),
                Ok(Ok((false, reason))) => Err(NetworkError::Rejected {
                    url: self.url.clone(),
                    reason,
                }),
                Ok(Err(_)) => Err(NetworkError::unreachable(
                    &self.url,
                    "connection closed before acknowledgement",
                )),
                Err(_) => {
                    lock(&self.waiters).acks.remove(&event.id);
                    Err(NetworkError::Timeout(format!(
                        "{} did not acknowledge event {}",
                        self.url, event.id
                    )))
                }
            }
        })
    }

    fn subscribe<'a>(
        &'a self,
        subscription_id: &'a str,
        filters: &'a [Filter],
    ) -> BoxFuture<'a, Result<(), NetworkError>> {
        Box::pin(async move {
            lock(&self.link)
                .subscriptions
                .insert(subscription_id.to_string(), filters.to_vec());
            self.send(ClientMessage::Req {
                subscription_id: subscription_id.to_string(),
                filters: filters.to_vec(),
            })
        })
    }

    fn unsubscribe<'a>(&'a self, subscription_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            lock(&self.link).subscriptions.remove(subscription_id);
            if self.is_connected() {
                let _ = self.send(ClientMessage::Close(subscription_id.to_string()));
            }
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<Duration, NetworkError>> {
        Box::pin(async move {
            if !self.is_connected() {
                self.open().await?;
            }
            let outbound = self.outbound()?;
            let payload = self.next_ping.fetch_add(1, Ordering::Relaxed).to_be_bytes().to_vec();
            let (tx, rx) = oneshot::channel();
            lock(&self.waiters).pongs.insert(payload.clone(), tx);

            let started = Instant::now();
            if outbound.send(Message::Ping(payload.clone().into())).is_err() {
                lock(&self.waiters).pongs.remove(&payload);
                return Err(NetworkError::NotConnected(self.url.clone()));
            }

            match timeout(self.config.ping_timeout, rx).await {
                Ok(Ok(())) => Ok(started.elapsed()),
                Ok(Err(_)) => Err(NetworkError::unreachable(&self.url, "connection closed during ping")),
                Err(_) => {
                    lock(&self.waiters).pongs.remove(&payload);
                    Err(NetworkError::Timeout(format!("{} did not answer ping", self.url)))
                }
            }
        })
    }
}
