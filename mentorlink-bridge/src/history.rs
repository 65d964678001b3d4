//! Bounded in-memory conversation history.
//!
//! The [`ConversationLog`] keeps the most recent routed messages so late
//! joiners can be caught up via the state snapshot. It is a live-session
//! aid, not a system of record: nothing is persisted and the log is lost
//! on process restart.

use std::collections::VecDeque;

use mentorlink_proto::message::BridgeMessage;

/// Default number of conversation entries retained for replay.
const DEFAULT_HISTORY_CAPACITY: usize = 16;

/// Append-only FIFO of delivered messages, capped at a fixed capacity.
///
/// Register handling and state snapshots are never appended; everything
/// else the router delivers (including join/leave events) is.
#[derive(Debug)]
pub struct ConversationLog {
    entries: VecDeque<BridgeMessage>,
    capacity: usize,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLog {
    /// Creates an empty log with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates an empty log retaining at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest once capacity is exceeded.
    pub fn append(&mut self, message: BridgeMessage) {
        self.entries.push_back(message);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Returns up to `limit` of the most recent entries in arrival order
    /// (most-recent-last). Reading does not consume.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<BridgeMessage> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Number of entries currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured retention cap.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
