//! Daily usage ledger for image-producing operations.
//!
//! Tracks one counter per calendar day, resets at day rollover, and
//! enforces a subscription-aware admission check before any operation that
//! produces an image. Usage is recorded only after an image was actually
//! returned, never speculatively.

use crate::model::UserUsage;
use crate::storage::{self, StorageError};
use chrono::Local;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Errors related to the usage ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to persist usage counter: {0}")]
    Storage(#[from] StorageError),
}

/// Today's calendar date as the ledger key (YYYY-MM-DD, local time)
fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Tracks and enforces the daily image-operation quota.
///
/// The read-reset-then-compare sequence runs under a single write lock; the
/// lock is never held across a network call.
pub struct UsageLedger {
    state: RwLock<UserUsage>,
    limit: u32,
    path: Option<PathBuf>,
}

impl UsageLedger {
    /// In-memory ledger starting fresh today
    pub fn new(limit: u32) -> Self {
        Self {
            state: RwLock::new(UserUsage::for_date(today())),
            limit,
            path: None,
        }
    }

    /// Ledger seeded with an existing counter (e.g. rehydrated state)
    pub fn from_state(usage: UserUsage, limit: u32) -> Self {
        Self {
            state: RwLock::new(usage),
            limit,
            path: None,
        }
    }

    /// Ledger backed by a JSON blob on disk
    pub fn open(path: PathBuf, limit: u32) -> Result<Self, LedgerError> {
        let usage = storage::load::<UserUsage>(&path)?
            .unwrap_or_else(|| UserUsage::for_date(today()));
        info!(
            "Usage ledger opened: {}/{} for {}",
            usage.image_count, limit, usage.last_reset_date
        );
        Ok(Self {
            state: RwLock::new(usage),
            limit,
            path: Some(path),
        })
    }

    /// Configured daily limit
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Snapshot of the current counter
    pub async fn usage(&self) -> UserUsage {
        self.state.read().await.clone()
    }

    /// Check whether an image-producing operation is currently admitted.
    ///
    /// Subscribed profiles are always admitted. A check on a new calendar
    /// day resets the counter to zero (and persists the reset) before the
    /// comparison. Checking never consumes quota.
    #[instrument(skip(self))]
    pub async fn check_admission(&self, subscribed: bool) -> Result<bool, LedgerError> {
        if subscribed {
            return Ok(true);
        }

        let date = today();
        let mut state = self.state.write().await;
        if state.last_reset_date != date {
            debug!("Day rollover: resetting usage counter for {}", date);
            *state = UserUsage::for_date(date);
            self.persist(&state)?;
            return Ok(true);
        }

        Ok(state.image_count < self.limit)
    }

    /// Record one successful image-producing operation.
    ///
    /// Must only be called after the upstream actually returned an image,
    /// to avoid overcounting on failure. No-op for subscribed profiles.
    #[instrument(skip(self))]
    pub async fn record_usage(&self, subscribed: bool) -> Result<(), LedgerError> {
        if subscribed {
            return Ok(());
        }

        let date = today();
        let mut state = self.state.write().await;
        if state.last_reset_date != date {
            *state = UserUsage::for_date(date);
        }
        state.image_count += 1;
        debug!("Usage recorded: {}/{}", state.image_count, self.limit);
        self.persist(&state)?;
        Ok(())
    }

    fn persist(&self, usage: &UserUsage) -> Result<(), LedgerError> {
        if let Some(path) = &self.path {
            storage::save(path, usage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn yesterday() -> String {
        (Local::now() - Duration::days(1))
            .format("%Y-%m-%d")
            .to_string()
    }

    #[tokio::test]
    async fn test_check_is_idempotent() {
        let ledger = UsageLedger::new(20);
        for _ in 0..10 {
            assert!(ledger.check_admission(false).await.unwrap());
        }
        assert_eq!(ledger.usage().await.image_count, 0);
    }

    #[tokio::test]
    async fn test_admission_tracks_recorded_usage() {
        let ledger = UsageLedger::new(3);
        for _ in 0..2 {
            ledger.record_usage(false).await.unwrap();
        }
        // 2 < 3
        assert!(ledger.check_admission(false).await.unwrap());

        ledger.record_usage(false).await.unwrap();
        // 3 == 3
        assert!(!ledger.check_admission(false).await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribed_profile_always_admitted() {
        let ledger = UsageLedger::from_state(
            UserUsage {
                last_reset_date: today(),
                image_count: 999,
            },
            20,
        );
        assert!(ledger.check_admission(true).await.unwrap());

        // Recording is a no-op for subscribers
        ledger.record_usage(true).await.unwrap();
        assert_eq!(ledger.usage().await.image_count, 999);
    }

    #[tokio::test]
    async fn test_day_rollover_resets_counter() {
        let ledger = UsageLedger::from_state(
            UserUsage {
                last_reset_date: yesterday(),
                image_count: 20,
            },
            20,
        );

        // Stale entry at the limit still admits today; the reset is
        // observable before the comparison.
        assert!(ledger.check_admission(false).await.unwrap());
        let usage = ledger.usage().await;
        assert_eq!(usage.image_count, 0);
        assert_eq!(usage.last_reset_date, today());
    }

    #[tokio::test]
    async fn test_counter_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.json");

        let ledger = UsageLedger::open(path.clone(), 20).unwrap();
        ledger.record_usage(false).await.unwrap();
        ledger.record_usage(false).await.unwrap();

        let reopened = UsageLedger::open(path, 20).unwrap();
        assert_eq!(reopened.usage().await.image_count, 2);
    }
}
