//! Migration lock lease with typestate-tracked lifecycle.
//!
//! A lease can only be renewed or released while it is `Held`. Releasing
//! consumes the lease, so a released lease cannot be renewed by accident.
//!
//! # State Transition Diagram
//!
//! ```text
//! (free) ─── acquire() ──→ Held ─── release() ──→ (free)
//!                           │
//!                      renew() ↺
//! ```
//!
//! Expiry is enforced by the cluster (row TTL). The `expires_at` kept here is
//! the holder's local estimate, logged when the lease is renewed.

use crate::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;

// ============================================================================
// LOCK RECORD (persisted row, state-independent)
// ============================================================================

/// The lock row as written to the lock table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub lock_id: String,
    pub owner: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl LockRecord {
    /// Build a record for an acquisition at `now` with time-to-live `ttl`.
    pub fn new(
        lock_id: impl Into<String>,
        owner: impl Into<String>,
        now: Timestamp,
        ttl: Duration,
    ) -> Self {
        Self {
            lock_id: lock_id.into(),
            owner: owner.into(),
            acquired_at: now,
            expires_at: expiry(now, ttl),
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Remaining time until expiry, `None` once expired.
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        if self.is_expired(now) {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }
}

/// Largest TTL the cluster accepts on a write (20 years).
pub const MAX_TTL: Duration = Duration::from_secs(630_720_000);

/// `now + ttl`, with `ttl` capped at [`MAX_TTL`] and the sum saturating.
fn expiry(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl.min(MAX_TTL))
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for lease states.
pub trait LeaseState: private::Sealed + Send + Sync {}

/// Lease is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Held;
impl LeaseState for Held {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Held {}
}

// ============================================================================
// LEASE
// ============================================================================

/// A migration lock lease with compile-time state tracking.
#[derive(Debug, Clone)]
pub struct Lease<S: LeaseState> {
    record: LockRecord,
    _state: PhantomData<S>,
}

impl<S: LeaseState> Lease<S> {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn lock_id(&self) -> &str {
        &self.record.lock_id
    }

    pub fn owner(&self) -> &str {
        &self.record.owner
    }
}

impl Lease<Held> {
    /// Wrap a record whose conditional insert was accepted.
    pub fn new(record: LockRecord) -> Self {
        Lease {
            record,
            _state: PhantomData,
        }
    }

    /// Push the local expiry estimate forward after a successful renewal.
    pub fn renewed(mut self, now: Timestamp, ttl: Duration) -> Self {
        self.record.acquired_at = now;
        self.record.expires_at = expiry(now, ttl);
        self
    }

    /// Release the lease, returning the record that must be deleted.
    pub fn release(self) -> LockRecord {
        self.record
    }
}
