/// Protocol version advertised in agent announcements.
pub const PROTOCOL_VERSION: &str = "arn/1.0";

// ── Event kinds ──

/// Addressable: only the latest announcement per (author, kind, `d` tag) is kept.
pub const KIND_AGENT_ANNOUNCEMENT: u16 = 31910;
pub const KIND_AGENT_REQUEST: u16 = 5910;
pub const KIND_AGENT_DISCOVERY: u16 = 5911;
pub const KIND_TASK_COORDINATION: u16 = 5912;
pub const KIND_AGENT_RESPONSE: u16 = 6910;
/// Ephemeral: relays forward but never store it.
pub const KIND_RELAY_STATUS: u16 = 21910;

// ── Routing tags ──

/// Recipient public key on directed events.
pub const TAG_RECIPIENT: &str = "p";
/// Replaceable identifier (`agentId`) on announcements.
pub const TAG_IDENTIFIER: &str = "d";
/// Capability advertised by an announcement or asked for by a request.
pub const TAG_CAPABILITY: &str = "t";
/// Request id carried by requests and responses.
pub const TAG_REQUEST: &str = "r";
/// Protocol version carried by announcements.
pub const TAG_VERSION: &str = "v";

// ── Timers ──

/// Profiles not re-announced for this long are evicted (10 minutes).
pub const DEFAULT_STALE_AFTER_SECS: u64 = 600;
/// Stale-agent sweep cadence (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Relay health probe cadence.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
/// Self-announcement cadence; must stay below the staleness threshold.
pub const DEFAULT_ANNOUNCE_INTERVAL_SECS: u64 = 300;
/// Bounded collection window for `discover_agents`.
pub const DEFAULT_DISCOVERY_WINDOW_MS: u64 = 3_000;
/// How long a relay has to acknowledge a published event.
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Latency reported for a relay whose last probe failed.
pub const UNREACHABLE_LATENCY_MS: i64 = -1;

/// Default relays used when no configuration is supplied.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];
