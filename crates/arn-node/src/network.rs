//! The agent network facade.
//!
//! `AgentNetwork` owns the relay pool and the node's tables, runs one event
//! loop while started, and exposes the caller operations. Handles are cheap
//! to clone and share one node.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arn_network::{
    PoolEvent, RelayHealthMonitor, RelayPool, RelayTransport, SignedRelayConfig,
    SignedRelayTransport, SimulatedRelayNetwork,
};
use arn_protocol::{
    AgentAdvertisement, AgentProfile, AgentRequest, AgentResponse, Cost, DiscoveryQuery, Event,
    EventKind, Filter, Identity, NetworkStatus, PublicKey, RelayStatus, ServiceRequest,
    TaskCoordination,
};
use arn_state::{
    AgentRegistry, InboundRequest, PendingRequests, TaskDirection, TaskLog, TaskRecord,
    UpsertOutcome,
};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{NodeConfig, TimerConfig, TransportKind};
use crate::notify::Notifications;
use crate::{announce, coordinator, router, NodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Phase {
    state: NodeState,
    started_at: Option<Instant>,
}

#[derive(Default)]
struct Lifecycle {
    event_loop: Option<JoinHandle<()>>,
    subscription: Option<String>,
}

struct Inner {
    identity: Identity,
    config: NodeConfig,
    pool: RelayPool,
    health: RelayHealthMonitor,
    phase: RwLock<Phase>,
    /// Serializes start and stop.
    lifecycle: Mutex<Lifecycle>,
    registry: RwLock<AgentRegistry>,
    pending: RwLock<PendingRequests>,
    tasks: RwLock<TaskLog>,
    /// Agents hosted by this node, re-announced periodically.
    local_agents: RwLock<BTreeMap<String, AgentAdvertisement>>,
    notifications: Notifications,
}

#[derive(Clone)]
pub struct AgentNetwork {
    inner: Arc<Inner>,
}

impl AgentNetwork {
    pub fn new(identity: Identity, relays: Vec<Arc<dyn RelayTransport>>, config: NodeConfig) -> Self {
        let pool = RelayPool::new(relays);
        let health = pool.health_monitor();
        let local_agents = config
            .agent
            .iter()
            .map(|ad| (ad.agent_id.clone(), ad.clone()))
            .collect();
        let notifications = Notifications::new(config.notification_capacity);

        Self {
            inner: Arc::new(Inner {
                identity,
                config,
                pool,
                health,
                phase: RwLock::new(Phase {
                    state: NodeState::Stopped,
                    started_at: None,
                }),
                lifecycle: Mutex::new(Lifecycle::default()),
                registry: RwLock::new(AgentRegistry::new()),
                pending: RwLock::new(PendingRequests::new()),
                tasks: RwLock::new(TaskLog::new()),
                local_agents: RwLock::new(local_agents),
                notifications,
            }),
        }
    }

    /// Build a node from configuration, loading (or creating) its identity.
    pub fn from_config(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let identity = Identity::load_or_create(&config.key_path()?)?;
        let relays = match config.network.transport {
            TransportKind::Websocket => websocket_transports(&config),
            TransportKind::Simulated => SimulatedRelayNetwork::new().transports(&config.network.relays),
        };
        Ok(Self::new(identity, relays, config))
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Connect to relays, install subscriptions and start the event loop.
    ///
    /// Unreachable relays are not fatal; the health monitor keeps probing
    /// them. Starting a running node is a no-op.
    pub async fn start(&self) -> Result<(), NodeError> {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock().await;
        if inner.phase.read().await.state == NodeState::Running {
            return Ok(());
        }
        inner.phase.write().await.state = NodeState::Starting;
        tracing::info!(
            identity = %inner.identity.public_key().short(),
            relays = inner.pool.relays().len(),
            "Starting agent network"
        );

        let connected = inner.pool.connect_all().await;
        if connected == 0 {
            tracing::warn!("No relay reachable at start, health probes will keep retrying");
        }
        inner.probe_relays().await;

        let subscription = inner.pool.subscribe(inner.inbound_filters()).await;
        lifecycle.subscription = Some(subscription.id);
        lifecycle.event_loop = Some(tokio::spawn(event_loop(
            Arc::downgrade(inner),
            subscription.events,
            inner.config.timers.clone(),
        )));

        {
            let mut phase = inner.phase.write().await;
            phase.state = NodeState::Running;
            phase.started_at = Some(Instant::now());
        }
        inner.announce_local_agents().await;
        tracing::info!(connected, "Agent network running");
        Ok(())
    }

    /// Stop the event loop and close every subscription and relay connection.
    /// Known agents and pending requests are kept for a later restart.
    pub async fn stop(&self) -> Result<(), NodeError> {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock().await;
        if inner.phase.read().await.state == NodeState::Stopped {
            return Ok(());
        }
        inner.phase.write().await.state = NodeState::Stopping;

        if let Some(event_loop) = lifecycle.event_loop.take() {
            event_loop.abort();
        }
        if let Some(id) = lifecycle.subscription.take() {
            inner.pool.unsubscribe(&id).await;
        }
        inner.pool.disconnect_all().await;

        let mut phase = inner.phase.write().await;
        phase.state = NodeState::Stopped;
        phase.started_at = None;
        tracing::info!("Agent network stopped");
        Ok(())
    }

    pub async fn state(&self) -> NodeState {
        self.inner.phase.read().await.state
    }

    async fn ensure_running(&self) -> Result<(), NodeError> {
        match self.inner.phase.read().await.state {
            NodeState::Running => Ok(()),
            _ => Err(NodeError::NetworkNotRunning),
        }
    }

    // ─── Agents ──────────────────────────────────────────────────────────────

    /// Publish `ad` as one of this node's agents and keep re-announcing it.
    pub async fn announce_agent(&self, ad: AgentAdvertisement) -> Result<AgentProfile, NodeError> {
        self.ensure_running().await?;
        ad.validate()
            .map_err(|e| NodeError::InvalidRequest(e.to_string()))?;

        let event = self.inner.publish_announcement(&ad).await?;
        self.inner
            .local_agents
            .write()
            .await
            .insert(ad.agent_id.clone(), ad.clone());
        let (outcome, profile) = self.inner.register_local(ad, &event).await;
        if outcome.is_news() {
            self.inner.notifications.agent_discovered.emit(profile.clone());
        }
        tracing::info!(agent_id = %profile.agent_id, "Announced agent");
        Ok(profile)
    }

    /// Ask the network for agents offering any of `capabilities` (any agent
    /// when empty) and return what is known once relays have replayed their
    /// stored announcements or the discovery window closes.
    pub async fn discover_agents(&self, capabilities: &[String]) -> Result<Vec<AgentProfile>, NodeError> {
        self.ensure_running().await?;
        let inner = &self.inner;

        let query = DiscoveryQuery {
            requester: inner.identity.public_key().clone(),
            capabilities: capabilities.to_vec(),
        };
        match announce::discovery_event(&query, &inner.identity) {
            Ok(event) => {
                if let Err(e) = inner.pool.publish(&event).await {
                    tracing::debug!(error = %e, "Discovery query not published");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to build discovery query"),
        }

        let mut filter = Filter::new()
            .kind(EventKind::AgentAnnouncement)
            .since(unix_now().saturating_sub(inner.config.timers.stale_after_secs));
        if !capabilities.is_empty() {
            filter = filter.capabilities(capabilities.iter().cloned());
        }
        let mut subscription = inner.pool.subscribe(vec![filter]).await;
        let deadline = tokio::time::Instant::now() + inner.config.discovery_window();
        loop {
            match tokio::time::timeout_at(deadline, subscription.events.recv()).await {
                Ok(Some(PoolEvent::Event { relay_url, event })) => {
                    if let Err(e) = inner.on_announcement(&relay_url, &event).await {
                        tracing::warn!(relay = %relay_url, event_id = %event.id, error = %e, "Dropping malformed event");
                    }
                }
                Ok(Some(PoolEvent::EndOfStored)) | Ok(None) | Err(_) => break,
            }
        }
        inner.pool.unsubscribe(&subscription.id).await;

        let found = inner.registry.read().await.find_by_any_capability(capabilities);
        tracing::debug!(found = found.len(), "Discovery finished");
        Ok(found)
    }

    /// Best agent for `task_type` among known agents; see
    /// [`AgentRegistry::find_best_agent`].
    pub async fn find_best_agent(&self, task_type: &str, max_cost: Option<&Cost>) -> Option<AgentProfile> {
        self.inner
            .registry
            .read()
            .await
            .find_best_agent(task_type, max_cost)
    }

    pub async fn known_agents(&self) -> Vec<AgentProfile> {
        self.inner.registry.read().await.all()
    }

    // ─── Requests ────────────────────────────────────────────────────────────

    /// Send a service request and return its id. The response arrives on
    /// [`AgentNetwork::on_response_received`].
    pub async fn request_agent_service(&self, service: ServiceRequest) -> Result<String, NodeError> {
        self.ensure_running().await?;
        let inner = &self.inner;

        let request = router::build_request(
            service,
            inner.identity.public_key().clone(),
            inner.pool.relay_urls(),
        )?;
        let route = router::route_request(&*inner.registry.read().await, &request);
        if route.recipients.is_empty() {
            tracing::warn!(request_id = %request.request_id, task_type = %request.task_type, "No known agent offers this task");
        }
        let event = router::request_event(&request, &route, &inner.identity)?;

        let request_id = request.request_id.clone();
        inner.pending.write().await.insert_outbound(request)?;
        if let Err(e) = inner.pool.publish(&event).await {
            inner.pending.write().await.cancel(&request_id);
            return Err(e.into());
        }
        tracing::info!(
            request_id = %request_id,
            mode = ?route.mode,
            recipients = route.recipients.len(),
            "Request sent"
        );
        Ok(request_id)
    }

    /// Answer a request received from another agent. Each request can be
    /// answered once.
    pub async fn respond_to_request(
        &self,
        request_id: &str,
        result: serde_json::Value,
        cost: Cost,
    ) -> Result<AgentResponse, NodeError> {
        self.ensure_running().await?;
        let inner = &self.inner;

        let inbound = inner
            .pending
            .read()
            .await
            .inbound(request_id)
            .cloned()
            .ok_or_else(|| NodeError::UnknownRequest(request_id.to_string()))?;
        let agent_id = inner.responding_agent_id(&inbound.request).await;
        let response = AgentResponse::signed(&inner.identity, request_id, agent_id, result, cost)?;
        let event = router::response_event(&response, &inbound.request.requester_pubkey, &inner.identity)?;

        inner.pool.publish(&event).await?;
        if inner.pending.write().await.take_inbound(request_id).is_err() {
            tracing::debug!(request_id, "Request answered concurrently");
        }
        inner.notifications.response_sent.emit(response.clone());
        tracing::info!(request_id, agent_id = %response.agent_id, "Response sent");
        Ok(response)
    }

    /// Stop waiting for a response. Returns false if the request was not pending.
    pub async fn cancel_request(&self, request_id: &str) -> Result<bool, NodeError> {
        self.ensure_running().await?;
        Ok(self.inner.pending.write().await.cancel(request_id))
    }

    // ─── Tasks ───────────────────────────────────────────────────────────────

    /// Announce a task to its participants. Agents that cannot be resolved to
    /// a key are left out of the coordination.
    pub async fn coordinate_task(
        &self,
        task_id: &str,
        agent_ids: &[String],
        task_data: serde_json::Value,
    ) -> Result<TaskCoordination, NodeError> {
        self.ensure_running().await?;
        if task_id.trim().is_empty() {
            return Err(NodeError::InvalidRequest("taskId is required".into()));
        }
        let inner = &self.inner;
        let me = inner.identity.public_key().clone();

        let participants =
            coordinator::resolve_participants(&*inner.registry.read().await, task_id, agent_ids);
        let coordination = TaskCoordination {
            task_id: task_id.to_string(),
            coordinator: me.clone(),
            agents: participants.agent_ids,
            task_data,
            timestamp: Utc::now(),
        };
        let event = coordinator::coordination_event(&coordination, &participants.keys, &inner.identity)?;
        inner.pool.publish(&event).await?;

        let includes_self = participants.keys.contains(&me);
        // False when our own relay echo was logged first; it already notified.
        let recorded = inner.tasks.write().await.record(TaskRecord {
            event_id: event.id.clone(),
            coordination: coordination.clone(),
            participants: participants.keys,
            direction: TaskDirection::Sent,
        });
        inner.notifications.task_coordinated.emit(coordination.clone());
        if includes_self && recorded {
            inner
                .notifications
                .task_coordination_received
                .emit(coordination.clone());
        }
        tracing::info!(task_id, agents = coordination.agents.len(), "Task coordinated");
        Ok(coordination)
    }

    /// Every coordination logged for `task_id`, oldest first.
    pub async fn task_history(&self, task_id: &str) -> Vec<TaskRecord> {
        self.inner
            .tasks
            .read()
            .await
            .for_task(task_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The most recent coordination logged for `task_id`.
    pub async fn latest_coordination(&self, task_id: &str) -> Option<TaskCoordination> {
        self.inner
            .tasks
            .read()
            .await
            .latest(task_id)
            .map(|record| record.coordination.clone())
    }

    // ─── Status ──────────────────────────────────────────────────────────────

    pub async fn network_status(&self) -> NetworkStatus {
        let inner = &self.inner;
        let (is_running, uptime_secs) = {
            let phase = inner.phase.read().await;
            (
                phase.state == NodeState::Running,
                phase.started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0),
            )
        };
        NetworkStatus {
            is_running,
            connected_relays: inner.health.board().read().await.connected_count(),
            total_relays: inner.pool.relays().len(),
            known_agents: inner.registry.read().await.len(),
            active_requests: inner.pending.read().await.len(),
            task_coordinations: inner.tasks.read().await.len(),
            uptime_secs,
        }
    }

    /// Relay statuses as of the last probe.
    pub async fn relay_statuses(&self) -> Vec<RelayStatus> {
        self.inner.health.board().read().await.snapshot()
    }

    /// Probe every relay now and return the fresh statuses.
    pub async fn check_relays(&self) -> Result<Vec<RelayStatus>, NodeError> {
        self.ensure_running().await?;
        self.inner.probe_relays().await;
        Ok(self.relay_statuses().await)
    }

    pub fn local_identity(&self) -> &PublicKey {
        self.inner.identity.public_key()
    }

    // ─── Notifications ───────────────────────────────────────────────────────

    pub fn on_agent_discovered(&self) -> mpsc::Receiver<AgentProfile> {
        self.inner.notifications.agent_discovered.subscribe()
    }

    pub fn on_request_received(&self) -> mpsc::Receiver<AgentRequest> {
        self.inner.notifications.request_received.subscribe()
    }

    pub fn on_response_received(&self) -> mpsc::Receiver<AgentResponse> {
        self.inner.notifications.response_received.subscribe()
    }

    pub fn on_response_sent(&self) -> mpsc::Receiver<AgentResponse> {
        self.inner.notifications.response_sent.subscribe()
    }

    pub fn on_task_coordinated(&self) -> mpsc::Receiver<TaskCoordination> {
        self.inner.notifications.task_coordinated.subscribe()
    }

    pub fn on_task_coordination_received(&self) -> mpsc::Receiver<TaskCoordination> {
        self.inner.notifications.task_coordination_received.subscribe()
    }
}

/// One websocket transport per configured relay url.
pub fn websocket_transports(config: &NodeConfig) -> Vec<Arc<dyn RelayTransport>> {
    let relay_config = SignedRelayConfig {
        connect_timeout: Duration::from_secs(config.network.connect_timeout_secs),
        publish_timeout: Duration::from_secs(config.network.publish_timeout_secs),
        ping_timeout: Duration::from_secs(config.network.publish_timeout_secs),
    };
    config
        .network
        .relays
        .iter()
        .map(|url| {
            Arc::new(SignedRelayTransport::new(url.clone(), relay_config.clone())) as Arc<dyn RelayTransport>
        })
        .collect()
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Interval whose first tick is one full period away.
fn interval_after(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Inbound events plus the periodic ping, sweep and announce timers. Holds
/// only a weak handle so a dropped node ends the loop.
async fn event_loop(node: Weak<Inner>, mut events: mpsc::Receiver<PoolEvent>, timers: TimerConfig) {
    let mut ping = interval_after(timers.ping_interval());
    let mut sweep = interval_after(timers.sweep_interval());
    let mut announce = interval_after(timers.announce_interval());

    loop {
        tokio::select! {
            received = events.recv() => {
                let Some(received) = received else { break };
                let Some(inner) = node.upgrade() else { break };
                if let PoolEvent::Event { relay_url, event } = received {
                    inner.handle_event(&relay_url, event).await;
                }
            }
            _ = ping.tick() => {
                let Some(inner) = node.upgrade() else { break };
                tokio::spawn(async move {
                    inner.probe_relays().await;
                });
            }
            _ = sweep.tick() => {
                let Some(inner) = node.upgrade() else { break };
                inner.sweep_stale().await;
            }
            _ = announce.tick() => {
                let Some(inner) = node.upgrade() else { break };
                tokio::spawn(async move {
                    inner.announce_local_agents().await;
                });
            }
        }
    }
    tracing::debug!("Event loop stopped");
}

impl Inner {
    /// Announcements still inside the staleness window, plus everything
    /// addressed to us and discovery queries from now on.
    fn inbound_filters(&self) -> Vec<Filter> {
        let me = self.identity.public_key();
        let now = unix_now();
        vec![
            Filter::new()
                .kind(EventKind::AgentAnnouncement)
                .since(now.saturating_sub(self.config.timers.stale_after_secs)),
            Filter::new().kind(EventKind::AgentRequest).recipient(me).since(now),
            Filter::new().kind(EventKind::AgentResponse).recipient(me).since(now),
            Filter::new().kind(EventKind::TaskCoordination).recipient(me).since(now),
            Filter::new().kind(EventKind::AgentDiscovery).since(now),
        ]
    }

    async fn handle_event(self: &Arc<Self>, relay_url: &str, event: Event) {
        let handled = match event.event_kind() {
            Some(EventKind::AgentAnnouncement) => self.on_announcement(relay_url, &event).await,
            Some(EventKind::AgentRequest) => self.on_request(&event).await,
            Some(EventKind::AgentResponse) => self.on_response(&event).await,
            Some(EventKind::TaskCoordination) => self.on_task_coordination(&event).await,
            Some(EventKind::AgentDiscovery) => self.on_discovery_query(&event).await,
            Some(EventKind::RelayStatus) | None => {
                tracing::trace!(kind = event.kind, "Ignoring event kind");
                Ok(())
            }
        };
        if let Err(e) = handled {
            tracing::warn!(
                relay = %relay_url,
                event_id = %event.id,
                kind = event.kind,
                error = %e,
                "Dropping malformed event"
            );
        }
    }

    async fn on_announcement(&self, relay_url: &str, event: &Event) -> Result<(), NodeError> {
        let profile = announce::profile_from_event(event, relay_url)?;
        let mut registry = self.registry.write().await;
        if &profile.public_key == self.identity.public_key() {
            registry.record_relay(&profile.agent_id, relay_url);
            return Ok(());
        }

        let agent_id = profile.agent_id.clone();
        let outcome = registry.upsert(profile);
        let discovered = if outcome.is_news() {
            registry.get(&agent_id).cloned()
        } else {
            None
        };
        drop(registry);

        if let Some(profile) = discovered {
            tracing::debug!(agent_id = %agent_id, outcome = ?outcome, relay = %relay_url, "Agent discovered");
            self.notifications.agent_discovered.emit(profile);
        }
        Ok(())
    }

    async fn on_request(&self, event: &Event) -> Result<(), NodeError> {
        let request: AgentRequest = event
            .parse_content(EventKind::AgentRequest)
            .map_err(|e| NodeError::MalformedEvent(e.to_string()))?;
        if request.requester_pubkey != event.author() {
            return Err(NodeError::MalformedEvent(
                "requesterPubkey does not match the event author".into(),
            ));
        }
        if !event.is_addressed_to(self.identity.public_key()) {
            return Ok(());
        }

        let recorded = self.pending.write().await.record_inbound(InboundRequest {
            request: request.clone(),
            event_id: event.id.clone(),
            received_at: Utc::now(),
        });
        if recorded {
            tracing::info!(
                request_id = %request.request_id,
                task_type = %request.task_type,
                requester = %request.requester_pubkey.short(),
                "Request received"
            );
            self.notifications.request_received.emit(request);
        }
        Ok(())
    }

    async fn on_response(&self, event: &Event) -> Result<(), NodeError> {
        let response: AgentResponse = event
            .parse_content(EventKind::AgentResponse)
            .map_err(|e| NodeError::MalformedEvent(e.to_string()))?;
        response
            .verify(&event.author())
            .map_err(|e| NodeError::MalformedEvent(format!("response signature: {e}")))?;

        let resolved = self.pending.write().await.resolve_outbound(&response.request_id);
        match resolved {
            Some(_) => {
                tracing::info!(
                    request_id = %response.request_id,
                    agent_id = %response.agent_id,
                    cost = %response.cost,
                    "Response received"
                );
                self.notifications.response_received.emit(response);
            }
            None => tracing::debug!(request_id = %response.request_id, "Response for unknown or answered request"),
        }
        Ok(())
    }

    async fn on_task_coordination(&self, event: &Event) -> Result<(), NodeError> {
        let coordination: TaskCoordination = event
            .parse_content(EventKind::TaskCoordination)
            .map_err(|e| NodeError::MalformedEvent(e.to_string()))?;
        let author = event.author();
        if coordination.coordinator != author {
            return Err(NodeError::MalformedEvent(
                "coordinator does not match the event author".into(),
            ));
        }

        let direction = if &author == self.identity.public_key() {
            TaskDirection::Sent
        } else {
            TaskDirection::Received
        };
        let recorded = self.tasks.write().await.record(TaskRecord {
            event_id: event.id.clone(),
            coordination: coordination.clone(),
            participants: event.recipients(),
            direction,
        });
        if recorded {
            tracing::info!(
                task_id = %coordination.task_id,
                coordinator = %author.short(),
                "Task coordination received"
            );
            self.notifications.task_coordination_received.emit(coordination);
        }
        Ok(())
    }

    /// Re-announce local agents matching someone else's discovery query.
    async fn on_discovery_query(self: &Arc<Self>, event: &Event) -> Result<(), NodeError> {
        let query: DiscoveryQuery = event
            .parse_content(EventKind::AgentDiscovery)
            .map_err(|e| NodeError::MalformedEvent(e.to_string()))?;
        if query.requester != event.author() {
            return Err(NodeError::MalformedEvent(
                "requester does not match the event author".into(),
            ));
        }
        if &query.requester == self.identity.public_key() {
            return Ok(());
        }

        let matching: Vec<AgentAdvertisement> = self
            .local_agents
            .read()
            .await
            .values()
            .filter(|ad| ad.offers_any(&query.capabilities))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Ok(());
        }

        tracing::debug!(requester = %query.requester.short(), agents = matching.len(), "Answering discovery query");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            for ad in matching {
                if let Err(e) = inner.publish_announcement(&ad).await {
                    tracing::warn!(agent_id = %ad.agent_id, error = %e, "Failed to answer discovery query");
                }
            }
        });
        Ok(())
    }

    async fn publish_announcement(&self, ad: &AgentAdvertisement) -> Result<Event, NodeError> {
        let event = announce::announcement_event(ad, &self.identity)?;
        self.pool.publish(&event).await?;
        Ok(event)
    }

    /// Record one of our own agents as announced by `event`.
    async fn register_local(&self, ad: AgentAdvertisement, event: &Event) -> (UpsertOutcome, AgentProfile) {
        let mut profile =
            AgentProfile::from_advertisement(ad, self.identity.public_key().clone(), event.created_at_utc());
        profile.relays = self
            .pool
            .relays()
            .iter()
            .filter(|r| r.is_connected())
            .map(|r| r.url().to_string())
            .collect();

        let agent_id = profile.agent_id.clone();
        let mut registry = self.registry.write().await;
        let outcome = registry.upsert(profile.clone());
        let stored = registry.get(&agent_id).cloned().unwrap_or(profile);
        (outcome, stored)
    }

    /// Periodic self-announcement; keeps our own entries fresh as well.
    async fn announce_local_agents(&self) {
        let agents: Vec<AgentAdvertisement> = self.local_agents.read().await.values().cloned().collect();
        for ad in agents {
            match self.publish_announcement(&ad).await {
                Ok(event) => {
                    let agent_id = ad.agent_id.clone();
                    let (outcome, _) = self.register_local(ad, &event).await;
                    tracing::debug!(agent_id = %agent_id, outcome = ?outcome, "Re-announced agent");
                }
                Err(e) => tracing::warn!(agent_id = %ad.agent_id, error = %e, "Announcement failed"),
            }
        }
    }

    /// The local agent answering `request`: the named target if it is ours,
    /// else one offering the task type, else any local agent.
    async fn responding_agent_id(&self, request: &AgentRequest) -> String {
        let local = self.local_agents.read().await;
        request
            .target_agent
            .as_ref()
            .filter(|target| local.contains_key(*target))
            .cloned()
            .or_else(|| {
                local
                    .values()
                    .find(|ad| ad.capabilities.contains(&request.task_type))
                    .map(|ad| ad.agent_id.clone())
            })
            .or_else(|| local.keys().next().cloned())
            .unwrap_or_else(|| self.identity.public_key().to_string())
    }

    async fn probe_relays(&self) -> usize {
        let counts = self.registry.read().await.relay_agent_counts();
        self.health.probe_all(&counts).await
    }

    async fn sweep_stale(&self) {
        let evicted = self
            .registry
            .write()
            .await
            .evict_stale(Utc::now(), self.config.timers.stale_after());
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Evicted stale agents");
        }

        let mut pending = self.pending.write().await;
        let expired = pending.expire_inbound(Utc::now(), self.config.timers.stale_after());
        for request_id in &expired {
            tracing::debug!(request_id = %request_id, "Expired unanswered request");
        }
        tracing::debug!(
            outbound = pending.outbound_len(),
            inbound = pending.inbound_len(),
            "Pending requests after sweep"
        );
    }
}
