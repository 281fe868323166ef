//! Process-wide status: latest canonical header, chain ID and start time.
//!
//! The reconciliation engine owns the [`StatusCache`] and publishes every
//! canonical head into it. Readers (the HTTP API) hold a [`StatusHandle`],
//! which can observe but never write.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::db::models::HeaderRecord;

/// Point-in-time copy of the status.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Seconds since the process started
    pub uptime: i64,
    /// Network chain ID (0 when unknown)
    pub chain_id: u64,
    /// Latest canonical header seen
    pub latest_header: Option<HeaderRecord>,
}

/// Writer side of the status.
#[derive(Debug)]
pub struct StatusCache {
    latest: watch::Sender<Option<HeaderRecord>>,
    chain_id: u64,
    started_at: DateTime<Utc>,
}

impl StatusCache {
    /// Create a cache for a chain, optionally seeded with a known head.
    #[must_use]
    pub fn new(chain_id: u64, latest: Option<HeaderRecord>) -> Self {
        let (sender, _) = watch::channel(latest);
        Self {
            latest: sender,
            chain_id,
            started_at: Utc::now(),
        }
    }

    /// Publish a new latest canonical header.
    pub fn set_latest(&self, header: HeaderRecord) {
        self.latest.send_replace(Some(header));
    }

    /// Get a read-only handle.
    #[must_use]
    pub fn handle(&self) -> StatusHandle {
        StatusHandle {
            latest: self.latest.subscribe(),
            chain_id: self.chain_id,
            started_at: self.started_at,
        }
    }

    /// Network chain ID.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Read-only view of the status, cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    latest: watch::Receiver<Option<HeaderRecord>>,
    chain_id: u64,
    started_at: DateTime<Utc>,
}

impl StatusHandle {
    /// Latest canonical header, if any.
    #[must_use]
    pub fn latest_header(&self) -> Option<HeaderRecord> {
        self.latest.borrow().clone()
    }

    /// Network chain ID.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Process start time.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Copy of the current status.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime: (Utc::now() - self.started_at).num_seconds(),
            chain_id: self.chain_id,
            latest_header: self.latest_header(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_observes_updates() {
        let cache = StatusCache::new(1, None);
        let handle = cache.handle();
        assert!(handle.latest_header().is_none());

        cache.set_latest(HeaderRecord {
            hash: "0xaa".to_string(),
            number: 7,
            ..Default::default()
        });

        assert_eq!(handle.latest_header().unwrap().number, 7);
        assert_eq!(handle.snapshot().chain_id, 1);
    }

    #[test]
    fn test_updates_without_readers() {
        let cache = StatusCache::new(61, None);
        cache.set_latest(HeaderRecord::default());
        assert!(cache.handle().latest_header().is_some());
    }

    #[test]
    fn test_seeded_value_visible() {
        let cache = StatusCache::new(
            1,
            Some(HeaderRecord {
                number: 3,
                ..Default::default()
            }),
        );
        let snapshot = cache.handle().snapshot();
        assert_eq!(snapshot.latest_header.unwrap().number, 3);
        assert!(snapshot.uptime >= 0);
    }
}
