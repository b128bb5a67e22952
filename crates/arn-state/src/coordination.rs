use std::collections::VecDeque;

use arn_protocol::{PublicKey, TaskCoordination};
use serde::{Deserialize, Serialize};

/// Coordinations kept in memory before the oldest are dropped.
pub const MAX_TASK_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskDirection {
    /// Formed by this node.
    Sent,
    /// Received from another coordinator.
    Received,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub event_id: String,
    pub coordination: TaskCoordination,
    pub participants: Vec<PublicKey>,
    pub direction: TaskDirection,
}

/// Every task coordination seen by this node, oldest first.
///
/// Entries are keyed by event id so a relay echo of our own coordination
/// is not logged twice; two coordinations sharing a `taskId` are distinct.
#[derive(Debug)]
pub struct TaskLog {
    entries: VecDeque<TaskRecord>,
    capacity: usize,
}

impl TaskLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TASK_LOG_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if the event was already logged.
    pub fn record(&mut self, record: TaskRecord) -> bool {
        if self.contains_event(&record.event_id) {
            return false;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
        true
    }

    pub fn contains_event(&self, event_id: &str) -> bool {
        self.entries.iter().any(|r| r.event_id == event_id)
    }

    /// Most recent coordination for `task_id`.
    pub fn latest(&self, task_id: &str) -> Option<&TaskRecord> {
        self.entries
            .iter()
            .rev()
            .find(|r| r.coordination.task_id == task_id)
    }

    pub fn for_task(&self, task_id: &str) -> Vec<&TaskRecord> {
        self.entries
            .iter()
            .filter(|r| r.coordination.task_id == task_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TaskLog {
    fn default() -> Self {
        Self::new()
    }
}
