//! Per-key lock table.
//!
//! Serializes read-modify-write cycles on individual records without a
//! database-wide lock. Locks are created lazily and shared by key, so two
//! writers touching the same account contend while writers on different
//! accounts proceed in parallel.
//!
//! Lock order: promo code lock before account lock. The account lock also
//! covers the account's 1:1 subscription row, so there is no separate
//! subscription lock to order against.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A table of lazily-created per-key mutexes.
#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<Vec<u8>, Arc<Mutex<()>>>>,
}

impl LockTable {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared lock for a key, creating it on first use.
    ///
    /// The caller holds the returned `Arc` and locks it for the duration of
    /// its read-modify-write cycle.
    #[must_use]
    pub fn lock_for(&self, key: &[u8]) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
