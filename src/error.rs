//! Error taxonomy for the relay core.
//!
//! Every per-event failure is classified here so the dispatcher can decide
//! between immediate retry, deferred retry with outcome recheck, and
//! operator escalation. Configuration failures are fatal before the poll
//! loop starts and are reported through `eyre` at the binary boundary.

use alloy::primitives::B256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Network/RPC failure talking to a ledger. Transient; retried with
    /// backoff at the orchestrator level.
    #[error("ledger connectivity failure: {0}")]
    Connectivity(String),

    /// A log could not be parsed against the expected event schema. The
    /// single event is skipped; the scan continues.
    #[error("failed to decode event log: {0}")]
    Decode(String),

    /// The ledger's entry point rejected the payload synchronously; no
    /// transaction was created. Retryable.
    #[error("submission rejected by ledger: {0}")]
    SubmissionRejected(String),

    /// The transaction entered the chain but contract logic rejected it.
    /// Never auto-retried; a blind retry of a reverting call wastes fee.
    #[error("transaction {tx_hash} reverted on-chain")]
    Reverted { tx_hash: B256 },

    /// Inclusion was not observed before the deadline. The transaction may
    /// still confirm; the recorded hash must be rechecked before any
    /// resubmission.
    #[error("outcome of transaction {tx_hash} unknown after {timeout_secs}s")]
    TimeoutUncertain { tx_hash: B256, timeout_secs: u64 },

    /// Invalid or incomplete configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether the failure left no transaction behind and may be retried
    /// without an outcome recheck.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Connectivity(_) | RelayError::SubmissionRejected(_)
        )
    }
}
