//! Fan-out of node notifications to any number of subscribers.

use std::sync::{Mutex, MutexGuard};

use arn_protocol::{AgentProfile, AgentRequest, AgentResponse, TaskCoordination};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One notification stream. Each subscriber gets its own bounded channel;
/// a subscriber that falls behind loses notifications instead of stalling
/// the node, and dropped receivers are forgotten on the next emit.
pub struct Topic<T> {
    name: &'static str,
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<T>>>,
}

impl<T: Clone> Topic<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        lock(&self.subscribers).push(tx);
        rx
    }

    pub fn emit(&self, value: T) {
        lock(&self.subscribers).retain(|tx| match tx.try_send(value.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(topic = self.name, "Subscriber lagging, notification dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

pub struct Notifications {
    pub agent_discovered: Topic<AgentProfile>,
    pub request_received: Topic<AgentRequest>,
    pub response_received: Topic<AgentResponse>,
    pub response_sent: Topic<AgentResponse>,
    pub task_coordinated: Topic<TaskCoordination>,
    pub task_coordination_received: Topic<TaskCoordination>,
}

impl Notifications {
    pub fn new(capacity: usize) -> Self {
        Self {
            agent_discovered: Topic::new("agent_discovered", capacity),
            request_received: Topic::new("request_received", capacity),
            response_received: Topic::new("response_received", capacity),
            response_sent: Topic::new("response_sent", capacity),
            task_coordinated: Topic::new("task_coordinated", capacity),
            task_coordination_received: Topic::new("task_coordination_received", capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_gets_a_copy() {
        let topic = Topic::new("t", 4);
        let mut a = topic.subscribe();
        let mut b = topic.subscribe();
        topic.emit(7u32);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_without_blocking() {
        let topic = Topic::new("t", 1);
        let mut rx = topic.subscribe();
        topic.emit(1u32);
        topic.emit(2u32);
        assert_eq!(rx.recv().await, Some(1));
        assert!(rx.try_recv().is_err());
        assert_eq!(topic.subscriber_count(), 1);
    }

    #[test]
    fn test_closed_subscriber_forgotten() {
        let topic = Topic::new("t", 1);
        drop(topic.subscribe());
        let _kept = topic.subscribe();
        topic.emit(1u32);
        assert_eq!(topic.subscriber_count(), 1);
    }
}
