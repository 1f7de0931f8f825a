//! Bounded in-memory event log surfaced over `GET /api/events`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;

pub const DEFAULT_CAPACITY: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: f64,
    pub level: EventLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

pub struct EventLog {
    clock: Arc<dyn Clock>,
    capacity: usize,
    entries: Mutex<VecDeque<Event>>,
}

impl EventLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            clock,
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn emit(&self, level: EventLevel, message: impl Into<String>, context: Option<Value>) {
        let event = Event {
            timestamp: self.clock.unix_time(),
            level,
            message: message.into(),
            context,
        };
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(EventLevel::Info, message, None);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(EventLevel::Warning, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(EventLevel::Error, message, None);
    }

    /// The most recent `limit` events, oldest first.
    pub fn list(&self, limit: usize) -> Vec<Event> {
        let entries = self.entries.lock().unwrap();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let log = EventLog::with_capacity(Arc::new(VirtualClock::new()), 3);
        for i in 0..5 {
            log.info(format!("event-{i}"));
        }
        let entries = log.list(10);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "event-2");
        assert_eq!(entries[2].message, "event-4");
    }

    #[test]
    fn list_respects_limit_tail() {
        let log = EventLog::new(Arc::new(VirtualClock::new()));
        for i in 0..10 {
            log.info(format!("event-{i}"));
        }
        let entries = log.list(3);
        assert_eq!(
            entries.iter().map(|e| e.message.clone()).collect::<Vec<_>>(),
            vec!["event-7", "event-8", "event-9"]
        );
    }
}
