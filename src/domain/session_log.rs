//! In-memory log of completed call sessions
//!
//! The orchestrator does not persist call history; it keeps a bounded ring
//! of the most recent sessions for the dashboard's "recent calls" view.

use crate::domain::call::session::CallDirection;
use crate::domain::shared::value_objects::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Ended locally by the user
    Completed,
    /// Remote party hung up
    RemoteHangup,
    /// Inbound offer rejected before answer
    Rejected,
    /// Signaling failure tore the call down
    Failed,
}

/// One completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub session_id: SessionId,
    pub remote_address: String,
    pub direction: CallDirection,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub reason: EndReason,
}

/// Bounded ring of completed sessions, newest last.
#[derive(Debug)]
pub struct SessionLog {
    entries: VecDeque<SessionLogEntry>,
    capacity: usize,
}

impl SessionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: SessionLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent entries first.
    pub fn recent(&self, count: usize) -> Vec<SessionLogEntry> {
        self.entries.iter().rev().take(count).cloned().collect()
    }

    pub fn all(&self) -> Vec<SessionLogEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
