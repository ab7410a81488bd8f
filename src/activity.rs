//! ==============================================================================
//! activity.rs - operator-facing feedback: activity log and status banner
//! ==============================================================================
//!
//! purpose:
//!     - ActivityLog: capped, append-only list of tagged messages. oldest
//!       entries are evicted past the capacity.
//!     - StatusBanner: one transient message that falls back to "Ready" once
//!       its display time has elapsed.
//!
//! the banner is evaluated against a caller-supplied tokio Instant instead of
//! owning a timer, so a paused test clock drives expiry.
//!
//! ==============================================================================

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_BANNER_TTL: Duration = Duration::from_secs(5);
pub const BANNER_IDLE: &str = "Ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub timestamp_ms: u64,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.entries.push_back(ActivityEntry {
            timestamp_ms: timestamp_ms(),
            severity,
            message: message.into(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// drop everything, leaving a single marker entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.push(Severity::Info, "Log cleared");
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&ActivityEntry> {
        self.entries.back()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// what the banner shows at a given instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannerState {
    pub message: String,
    /// None for neutral "in progress" messages and the idle text
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone)]
pub struct StatusBanner {
    ttl: Duration,
    current: Option<(BannerState, Instant)>,
}

impl StatusBanner {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, current: None }
    }

    pub fn show(&mut self, message: impl Into<String>, severity: Option<Severity>, now: Instant) {
        self.current = Some((
            BannerState {
                message: message.into(),
                severity,
            },
            now,
        ));
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let (_, shown_at) = self.current.as_ref()?;
        self.ttl
            .checked_sub(now.saturating_duration_since(*shown_at))
            .filter(|left| !left.is_zero())
    }

    pub fn state(&self, now: Instant) -> BannerState {
        match &self.current {
            Some((state, shown_at)) if now.saturating_duration_since(*shown_at) < self.ttl => state.clone(),
            _ => BannerState {
                message: BANNER_IDLE.to_string(),
                severity: None,
            },
        }
    }
}

impl Default for StatusBanner {
    fn default() -> Self {
        Self::new(DEFAULT_BANNER_TTL)
    }
}

/// get current timestamp in milliseconds (unix epoch)
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
