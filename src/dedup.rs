//! Dedup/idempotency guard for bridge events.
//!
//! The scan window deliberately overlaps between polls, so every event is
//! typically re-observed several times. This guard is the sole mechanism
//! preventing those re-observations from producing duplicate wrap/withdraw
//! submissions: `admit` atomically claims a key before any work starts and
//! `release` records how the attempt ended.
//!
//! Bounded in size and age so memory stays flat under long runtimes or
//! adversarial event volume. Settled and permanently failed entries may be
//! evicted sooner than unknown-outcome ones; an unknown entry carries a
//! possibly still in-flight transaction and must outlive it.

use alloy::primitives::B256;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::EventKey;

const DEFAULT_MAX_ENTRIES: usize = 100_000;
/// Settled/failed entries only need to cover the overlapping scan window.
const DEFAULT_RESOLVED_TTL: Duration = Duration::from_secs(3_600);
/// Unknown entries guard against resurrecting an in-flight duplicate.
const DEFAULT_UNKNOWN_TTL: Duration = Duration::from_secs(86_400);
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Lifecycle state of an event key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// A dispatch for this key is in flight right now.
    Pending { attempts: u32 },
    /// Compensating transaction confirmed.
    Settled,
    /// Reverted on-chain or out of retry budget; operator intervention.
    FailedPermanent,
    /// Submission timed out; the transaction may still confirm later.
    Unknown { tx_hash: B256, attempts: u32 },
}

/// How a released key resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Settled,
    FailedPermanent,
    /// Outcome unknown; remember the submission hash for the recheck that
    /// must precede any resubmission.
    Unknown { tx_hash: B256 },
    /// Nothing was submitted; forget the key entirely so the event may be
    /// retried immediately.
    Abandoned,
}

/// Decision returned by [`DedupGuard::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting; caller owns the key until `release`.
    Admitted,
    /// Prior attempt ended with an unknown outcome. Caller owns the key but
    /// must recheck `prior_submission` before submitting again.
    Retry { prior_submission: B256, attempt: u32 },
    /// Key is pending elsewhere, settled, or permanently failed.
    Duplicate,
}

/// Bounded-size, bounded-age map from event key to processing state.
pub struct DedupGuard {
    entries: HashMap<EventKey, (EntryState, Instant)>,
    max_entries: usize,
    resolved_ttl: Duration,
    unknown_ttl: Duration,
    max_retry_attempts: u32,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ENTRIES,
            DEFAULT_RESOLVED_TTL,
            DEFAULT_UNKNOWN_TTL,
            DEFAULT_MAX_RETRY_ATTEMPTS,
        )
    }
}

impl DedupGuard {
    pub fn new(
        max_entries: usize,
        resolved_ttl: Duration,
        unknown_ttl: Duration,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            resolved_ttl,
            unknown_ttl,
            max_retry_attempts,
        }
    }

    /// Attempt to claim `key` for processing.
    ///
    /// Transitions absent → Pending, and Unknown (within the retry budget) →
    /// Pending. Everything else is a duplicate. An Unknown key that has
    /// exhausted its budget degrades to FailedPermanent.
    pub fn admit(&mut self, key: EventKey) -> Admission {
        self.evict_stale();

        match self.entries.get(&key).map(|(state, _)| *state) {
            None => {
                self.insert(key, EntryState::Pending { attempts: 0 });
                Admission::Admitted
            }
            Some(EntryState::Unknown { tx_hash, attempts }) => {
                if attempts >= self.max_retry_attempts {
                    tracing::warn!(
                        %key,
                        attempts,
                        "Retry budget exhausted for unknown-outcome event, marking failed"
                    );
                    self.insert(key, EntryState::FailedPermanent);
                    return Admission::Duplicate;
                }
                self.insert(key, EntryState::Pending { attempts });
                Admission::Retry {
                    prior_submission: tx_hash,
                    attempt: attempts,
                }
            }
            Some(_) => Admission::Duplicate,
        }
    }

    /// Resolve a previously admitted key. Only Pending entries transition;
    /// releasing a key that is not pending is a no-op.
    pub fn release(&mut self, key: EventKey, resolution: Resolution) {
        let attempts = match self.entries.get(&key).map(|(state, _)| *state) {
            Some(EntryState::Pending { attempts }) => attempts,
            _ => return,
        };

        match resolution {
            Resolution::Settled => self.insert(key, EntryState::Settled),
            Resolution::FailedPermanent => self.insert(key, EntryState::FailedPermanent),
            Resolution::Unknown { tx_hash } => self.insert(
                key,
                EntryState::Unknown {
                    tx_hash,
                    attempts: attempts + 1,
                },
            ),
            Resolution::Abandoned => {
                self.entries.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: EventKey, state: EntryState) {
        while self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            // Prefer evicting resolved entries; a Pending entry is owned by
            // an in-flight dispatch and goes last.
            let oldest = self
                .entries
                .iter()
                .filter(|(_, (state, _))| !matches!(state, EntryState::Pending { .. }))
                .min_by_key(|(_, (_, t))| *t)
                .map(|(k, _)| *k)
                .or_else(|| {
                    self.entries
                        .iter()
                        .min_by_key(|(_, (_, t))| *t)
                        .map(|(k, _)| *k)
                });
            match oldest {
                Some(k) => {
                    self.entries.remove(&k);
                }
                None => break,
            }
        }
        self.entries.insert(key, (state, Instant::now()));
    }

    fn evict_stale(&mut self) {
        let resolved_ttl = self.resolved_ttl;
        let unknown_ttl = self.unknown_ttl;
        self.entries.retain(|_, (state, inserted)| {
            let age = inserted.elapsed();
            match state {
                // Pending entries are owned by an in-flight dispatch and are
                // never aged out from under it.
                EntryState::Pending { .. } => true,
                EntryState::Settled | EntryState::FailedPermanent => age < resolved_ttl,
                EntryState::Unknown { .. } => age < unknown_ttl,
            }
        });
    }
}
