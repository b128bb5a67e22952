//! The seam between the relay pool and a concrete relay connection.

use std::time::Duration;

use arn_protocol::{Event, Filter};
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::NetworkError;

/// Inbound traffic from one relay, funnelled into the pool's dispatcher.
#[derive(Debug, Clone)]
pub enum RelayFrame {
    Event {
        relay_url: String,
        subscription_id: String,
        event: Event,
    },
    /// The relay finished replaying stored events for a subscription.
    EndOfStored {
        relay_url: String,
        subscription_id: String,
    },
    /// The connection dropped; subscriptions are replayed on reconnect.
    Disconnected { relay_url: String },
}

pub type FrameSender = mpsc::UnboundedSender<RelayFrame>;

/// A connection to a single relay.
///
/// Implementations remember every subscription so that a reconnect
/// (triggered by [`RelayTransport::ping`]) can replay them.
pub trait RelayTransport: Send + Sync {
    fn url(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Open the connection; inbound frames are delivered to `frames`.
    fn connect(&self, frames: FrameSender) -> BoxFuture<'_, Result<(), NetworkError>>;

    fn disconnect(&self) -> BoxFuture<'_, ()>;

    /// Publish `event` and wait for the relay to accept it.
    fn publish<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), NetworkError>>;

    /// Open (or replace) a subscription. The subscription is remembered
    /// even when sending it fails.
    fn subscribe<'a>(
        &'a self,
        subscription_id: &'a str,
        filters: &'a [Filter],
    ) -> BoxFuture<'a, Result<(), NetworkError>>;

    fn unsubscribe<'a>(&'a self, subscription_id: &'a str) -> BoxFuture<'a, ()>;

    /// Round-trip probe. A disconnected transport first tries to reconnect
    /// and replay its subscriptions.
    fn ping(&self) -> BoxFuture<'_, Result<Duration, NetworkError>>;
}
