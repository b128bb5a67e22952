use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long an event id is remembered per subscription.
pub const DEFAULT_SEEN_WINDOW: Duration = Duration::from_secs(600);

/// Rolling window of event ids already delivered on one subscription.
///
/// The same event usually arrives once per relay; only the first copy
/// passes. Entries older than the window are evicted on each check.
#[derive(Debug)]
pub struct SeenEvents {
    /// event id → first time seen
    seen: HashMap<String, Instant>,
    window: Duration,
}

impl SeenEvents {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            window,
        }
    }

    /// Record `event_id`; returns false when it was already seen.
    pub fn check_and_insert(&mut self, event_id: &str) -> bool {
        self.check_and_insert_at(event_id, Instant::now())
    }

    pub fn check_and_insert_at(&mut self, event_id: &str, now: Instant) -> bool {
        let window = self.window;
        self.seen
            .retain(|_, first| now.saturating_duration_since(*first) < window);

        if self.seen.contains_key(event_id) {
            return false;
        }
        self.seen.insert(event_id.to_string(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for SeenEvents {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_WINDOW)
    }
}
