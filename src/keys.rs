//! API key rotation.
//!
//! Outbound calls spread load across multiple quota allocations by taking
//! the next key round-robin. There is no health checking or back-off: a
//! failing key simply comes around again on its next natural turn.

use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;

/// Errors related to key rotation
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("No API keys configured")]
    NoKeys,
}

/// Hands out API keys round-robin.
///
/// The rotation index grows without bound; the modulo keeps selection
/// well-defined indefinitely, and a wrapped counter is acceptable.
pub struct KeyRotator {
    keys: Vec<String>,
    index: AtomicUsize,
}

impl KeyRotator {
    /// Build a rotator from an ordered, non-empty key list
    pub fn new(keys: Vec<String>) -> Result<Self, RotationError> {
        if keys.is_empty() {
            return Err(RotationError::NoKeys);
        }
        debug!("Key rotator initialized with {} key(s)", keys.len());
        Ok(Self {
            keys,
            index: AtomicUsize::new(0),
        })
    }

    /// Return the next key in rotation.
    ///
    /// The fetch-and-increment is atomic so concurrent sends never observe
    /// the same index under a race.
    pub fn next_key(&self) -> &str {
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        &self.keys[i % self.keys.len()]
    }

    /// Number of configured keys
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Restart rotation from the first key
    pub fn reset(&self) {
        self.index.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(matches!(KeyRotator::new(vec![]), Err(RotationError::NoKeys)));
    }

    #[test]
    fn test_round_robin_wraps() {
        let rotator =
            KeyRotator::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]).unwrap();
        assert_eq!(rotator.next_key(), "a");
        assert_eq!(rotator.next_key(), "b");
        assert_eq!(rotator.next_key(), "c");
        assert_eq!(rotator.next_key(), "a");
        assert_eq!(rotator.key_count(), 3);
    }

    #[test]
    fn test_reset_restarts_rotation() {
        let rotator = KeyRotator::new(vec!["a".to_string(), "b".to_string()]).unwrap();
        rotator.next_key();
        rotator.reset();
        assert_eq!(rotator.next_key(), "a");
    }

    #[test]
    fn test_single_key_always_returned() {
        let rotator = KeyRotator::new(vec!["only".to_string()]).unwrap();
        for _ in 0..5 {
            assert_eq!(rotator.next_key(), "only");
        }
    }
}
