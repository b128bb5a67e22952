//! Relay connectivity tracking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arn_protocol::constants::UNREACHABLE_LATENCY_MS;
use arn_protocol::RelayStatus;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::transport::RelayTransport;

/// Last observed status of every relay, in configuration order.
///
/// Written by [`RelayHealthMonitor`] and read by the pool to decide where to
/// publish.
#[derive(Debug, Clone)]
pub struct RelayStatusBoard {
    statuses: Vec<RelayStatus>,
}

impl RelayStatusBoard {
    pub fn new<S: AsRef<str>>(urls: &[S]) -> Self {
        Self {
            statuses: urls.iter().map(|u| RelayStatus::unknown(u.as_ref())).collect(),
        }
    }

    fn entry(&mut self, url: &str) -> &mut RelayStatus {
        if let Some(pos) = self.statuses.iter().position(|s| s.url == url) {
            &mut self.statuses[pos]
        } else {
            self.statuses.push(RelayStatus::unknown(url));
            let last = self.statuses.len() - 1;
            &mut self.statuses[last]
        }
    }

    pub fn record_success(&mut self, url: &str, latency: Duration, at: DateTime<Utc>) {
        let status = self.entry(url);
        status.connected = true;
        status.latency_ms = latency.as_millis().min(i64::MAX as u128) as i64;
        status.last_ping = Some(at);
    }

    pub fn record_failure(&mut self, url: &str, at: DateTime<Utc>) {
        let status = self.entry(url);
        status.connected = false;
        status.latency_ms = UNREACHABLE_LATENCY_MS;
        status.last_ping = Some(at);
    }

    pub fn set_agent_count(&mut self, url: &str, count: usize) {
        self.entry(url).agent_count = count;
    }

    pub fn get(&self, url: &str) -> Option<&RelayStatus> {
        self.statuses.iter().find(|s| s.url == url)
    }

    pub fn snapshot(&self) -> Vec<RelayStatus> {
        self.statuses.clone()
    }

    pub fn connected_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.connected).count()
    }

    /// A relay is excluded from publishing once a probe has failed, until a
    /// later probe succeeds. Never-probed relays are not excluded.
    pub fn is_excluded(&self, url: &str) -> bool {
        self.get(url)
            .map(|s| s.last_ping.is_some() && !s.connected)
            .unwrap_or(false)
    }
}

/// Probes every relay and records the outcome on the shared board.
///
/// Relays are never dropped; a failing relay is re-probed (and reconnected
/// by its transport) on every pass.
pub struct RelayHealthMonitor {
    relays: Vec<Arc<dyn RelayTransport>>,
    board: Arc<RwLock<RelayStatusBoard>>,
}

impl RelayHealthMonitor {
    pub fn new(relays: Vec<Arc<dyn RelayTransport>>, board: Arc<RwLock<RelayStatusBoard>>) -> Self {
        Self { relays, board }
    }

    /// Probe all relays concurrently; returns how many answered.
    ///
    /// `agent_counts` maps relay url to the number of known agents seen on it.
    pub async fn probe_all(&self, agent_counts: &HashMap<String, usize>) -> usize {
        let probes = self.relays.iter().map(|relay| async move {
            let result = relay.ping().await;
            (relay.url().to_string(), result)
        });
        let results = futures::future::join_all(probes).await;

        let now = Utc::now();
        let mut board = self.board.write().await;
        let mut healthy = 0;
        for (url, result) in results {
            let previously_up = board.get(&url).map_or(false, |s| s.connected);
            let probed_before = board.get(&url).map_or(false, |s| s.last_ping.is_some());
            match result {
                Ok(latency) => {
                    healthy += 1;
                    if !previously_up {
                        tracing::info!(relay = %url, latency_ms = latency.as_millis() as u64, "Relay healthy");
                    }
                    board.record_success(&url, latency, now);
                }
                Err(e) => {
                    if previously_up || !probed_before {
                        tracing::warn!(relay = %url, error = %e, "Relay unreachable");
                    } else {
                        tracing::debug!(relay = %url, error = %e, "Relay still unreachable");
                    }
                    board.record_failure(&url, now);
                }
            }
            board.set_agent_count(&url, agent_counts.get(&url).copied().unwrap_or(0));
        }
        healthy
    }

    pub fn board(&self) -> Arc<RwLock<RelayStatusBoard>> {
        self.board.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_marks_unreachable() {
        let mut board = RelayStatusBoard::new(&["wss://a", "wss://b"]);
        let now = Utc::now();
        board.record_success("wss://a", Duration::from_millis(42), now);
        board.record_failure("wss://b", now);

        let a = board.get("wss://a").unwrap();
        assert!(a.connected);
        assert_eq!(a.latency_ms, 42);
        let b = board.get("wss://b").unwrap();
        assert!(!b.connected);
        assert_eq!(b.latency_ms, -1);
        assert_eq!(board.connected_count(), 1);
    }

    #[test]
    fn test_exclusion_only_after_failed_probe() {
        let mut board = RelayStatusBoard::new(&["wss://a"]);
        assert!(!board.is_excluded("wss://a"));
        board.record_failure("wss://a", Utc::now());
        assert!(board.is_excluded("wss://a"));
        board.record_success("wss://a", Duration::from_millis(5), Utc::now());
        assert!(!board.is_excluded("wss://a"));
    }

    #[test]
    fn test_snapshot_keeps_configuration_order() {
        let mut board = RelayStatusBoard::new(&["wss://b", "wss://a"]);
        board.set_agent_count("wss://a", 3);
        let urls: Vec<_> = board.snapshot().into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["wss://b", "wss://a"]);
        assert_eq!(board.get("wss://a").unwrap().agent_count, 3);
    }
}
