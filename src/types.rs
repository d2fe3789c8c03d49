//! Common types for the bridge relay.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the bridge a ledger plays.
///
/// Fixed at configuration time; decides which event kind is watched on that
/// chain and which compensating call is issued on the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainRole {
    Source,
    Destination,
}

impl ChainRole {
    /// The chain a compensating call for this chain's events goes to.
    pub fn counterpart(self) -> ChainRole {
        match self {
            ChainRole::Source => ChainRole::Destination,
            ChainRole::Destination => ChainRole::Source,
        }
    }

    /// The event kind watched on this chain.
    pub fn watched_event(self) -> EventKind {
        match self {
            ChainRole::Source => EventKind::Deposit,
            ChainRole::Destination => EventKind::Unwrap,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainRole::Source => "source",
            ChainRole::Destination => "destination",
        }
    }
}

impl fmt::Display for ChainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bridge event kinds observed on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Asset locked on the source chain; compensated by `wrap` on destination.
    Deposit,
    /// Wrapped asset burned on the destination chain; compensated by
    /// `withdraw` on source.
    Unwrap,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Deposit => write!(f, "Deposit"),
            EventKind::Unwrap => write!(f, "Unwrap"),
        }
    }
}

/// Natural unique key of a bridge event, stable across re-scans of the same
/// block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub tx_hash: B256,
    pub log_index: u64,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.log_index)
    }
}

/// A decoded Deposit or Unwrap log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEvent {
    /// Chain the event was observed on.
    pub origin: ChainRole,
    pub kind: EventKind,
    /// For Unwrap events this is the underlying token, not the wrapped
    /// representation.
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
}

impl BridgeEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }
}

/// Function invoked on the target chain to compensate an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFunction {
    Wrap,
    Withdraw,
}

impl fmt::Display for RelayFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayFunction::Wrap => write!(f, "wrap"),
            RelayFunction::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// Compensating call derived 1:1 from a [`BridgeEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAction {
    pub target: ChainRole,
    pub function: RelayFunction,
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
}

impl RelayAction {
    /// Deposit on source becomes wrap on destination; Unwrap on destination
    /// becomes withdraw on source.
    pub fn for_event(event: &BridgeEvent) -> Self {
        let (target, function) = match event.kind {
            EventKind::Deposit => (ChainRole::Destination, RelayFunction::Wrap),
            EventKind::Unwrap => (ChainRole::Source, RelayFunction::Withdraw),
        };
        Self {
            target,
            function,
            token: event.token,
            recipient: event.recipient,
            amount: event.amount,
        }
    }
}

/// Final classification of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed,
    Reverted,
    TimedOut,
}

/// Result of dispatching one bridge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Compensating transaction confirmed on the target chain.
    Succeeded,
    /// Event already seen (pending, settled, or permanently failed).
    SkippedDuplicate,
    /// Transaction reverted on-chain; requires operator intervention.
    FailedPermanent,
    /// Transient failure (connectivity, rejection, or unknown outcome);
    /// eligible for retry on a later poll.
    FailedRetryable,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Succeeded => "succeeded",
            DispatchOutcome::SkippedDuplicate => "skipped_duplicate",
            DispatchOutcome::FailedPermanent => "failed_permanent",
            DispatchOutcome::FailedRetryable => "failed_retryable",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn event(kind: EventKind) -> BridgeEvent {
        BridgeEvent {
            origin: match kind {
                EventKind::Deposit => ChainRole::Source,
                EventKind::Unwrap => ChainRole::Destination,
            },
            kind,
            token: address!("00000000000000000000000000000000000000aa"),
            recipient: address!("00000000000000000000000000000000000000bb"),
            amount: U256::from(100u64),
            tx_hash: B256::with_last_byte(1),
            block_number: 7,
            log_index: 0,
        }
    }

    #[test]
    fn test_deposit_maps_to_wrap_on_destination() {
        let action = RelayAction::for_event(&event(EventKind::Deposit));
        assert_eq!(action.target, ChainRole::Destination);
        assert_eq!(action.function, RelayFunction::Wrap);
        assert_eq!(action.amount, U256::from(100u64));
    }

    #[test]
    fn test_unwrap_maps_to_withdraw_on_source() {
        let action = RelayAction::for_event(&event(EventKind::Unwrap));
        assert_eq!(action.target, ChainRole::Source);
        assert_eq!(action.function, RelayFunction::Withdraw);
    }

    #[test]
    fn test_counterpart_is_involutive() {
        assert_eq!(ChainRole::Source.counterpart(), ChainRole::Destination);
        assert_eq!(ChainRole::Destination.counterpart(), ChainRole::Source);
    }

    #[test]
    fn test_watched_event_per_role() {
        assert_eq!(ChainRole::Source.watched_event(), EventKind::Deposit);
        assert_eq!(ChainRole::Destination.watched_event(), EventKind::Unwrap);
    }

    #[test]
    fn test_event_key_stable() {
        let a = event(EventKind::Deposit);
        let b = event(EventKind::Deposit);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_dispatch_outcome_display() {
        assert_eq!(format!("{}", DispatchOutcome::Succeeded), "succeeded");
        assert_eq!(
            format!("{}", DispatchOutcome::SkippedDuplicate),
            "skipped_duplicate"
        );
    }
}
