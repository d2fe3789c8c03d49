//! Relay dispatcher: turns a bridge event into a signed compensating call
//! on the counterpart chain.
//!
//! The dispatcher reads the target chain's nonce immediately before signing,
//! so instances must be driven serially per target chain (one worker per
//! chain in the orchestrator). Admission through the dedup guard brackets
//! every attempt; whatever happens, the key is released with a resolution
//! that tells future polls what they may do with the same event.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::LedgerClient;
use crate::contracts::Bridge;
use crate::dedup::{Admission, DedupGuard, Resolution};
use crate::error::RelayError;
use crate::types::{BridgeEvent, DispatchOutcome, EventKey, RelayAction, RelayFunction, TxOutcome};

/// Gas limit for wrap/withdraw calls.
const RELAY_GAS_LIMIT: u64 = 300_000;

/// The single custodial signing credential, shared read-only by both chains.
#[derive(Clone)]
pub struct WardenIdentity {
    signer: PrivateKeySigner,
    address: Address,
}

impl WardenIdentity {
    pub fn from_key(key: &str) -> Result<Self, RelayError> {
        let signer: PrivateKeySigner = key
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid warden key: {e}")))?;
        let address = signer.address();
        Ok(Self { signer, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

/// Redacts the key material; only the derived address is loggable.
impl fmt::Debug for WardenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WardenIdentity")
            .field("address", &self.address)
            .field("signer", &"<redacted>")
            .finish()
    }
}

/// Shared dedup guard handle.
pub type SharedGuard = Arc<Mutex<DedupGuard>>;

/// Dispatches compensating calls to one target chain.
pub struct Dispatcher {
    target: Arc<dyn LedgerClient>,
    warden: WardenIdentity,
    guard: SharedGuard,
    /// Bound on waiting for the compensating transaction to land.
    confirmation_timeout: Duration,
    /// Shorter bound used when rechecking a prior unknown-outcome submission.
    recheck_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        target: Arc<dyn LedgerClient>,
        warden: WardenIdentity,
        guard: SharedGuard,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            target,
            warden,
            guard,
            confirmation_timeout,
            recheck_timeout: Duration::from_secs(10),
        }
    }

    /// Process one bridge event end to end.
    ///
    /// Per-event failures are classified into the returned outcome and
    /// logged; they never propagate to the caller.
    pub async fn dispatch(&self, event: &BridgeEvent) -> DispatchOutcome {
        let key = event.key();

        // Set when the admission carried a prior unknown-outcome submission
        // that has not been ruled out yet; any bail-out below must keep the
        // recheck obligation alive instead of forgetting the key.
        let mut unresolved_prior: Option<B256> = None;

        let admission = self.guard.lock().await.admit(key);
        match admission {
            Admission::Duplicate => {
                debug!(%key, chain = %event.origin, "Event already handled, skipping");
                return DispatchOutcome::SkippedDuplicate;
            }
            Admission::Retry {
                prior_submission,
                attempt,
            } => {
                // A prior submission timed out. It may have landed since;
                // resubmitting without checking would risk a double payout.
                match self
                    .target
                    .await_outcome(prior_submission, self.recheck_timeout)
                    .await
                {
                    Ok(TxOutcome::Confirmed) => {
                        info!(
                            %key,
                            tx_hash = %prior_submission,
                            "Prior submission confirmed on recheck, settling without resubmission"
                        );
                        self.release(key, Resolution::Settled).await;
                        return DispatchOutcome::Succeeded;
                    }
                    Ok(TxOutcome::Reverted) => {
                        error!(
                            %key,
                            tx_hash = %prior_submission,
                            "Prior submission reverted, not retrying"
                        );
                        self.release(key, Resolution::FailedPermanent).await;
                        return DispatchOutcome::FailedPermanent;
                    }
                    Ok(TxOutcome::TimedOut) => {
                        warn!(
                            %key,
                            tx_hash = %prior_submission,
                            attempt,
                            "Prior submission still unconfirmed, resubmitting"
                        );
                        unresolved_prior = Some(prior_submission);
                    }
                    Err(e) => {
                        // Cannot tell whether the prior transaction landed;
                        // resubmitting blind is not safe.
                        warn!(%key, error = %e, "Outcome recheck failed, deferring retry");
                        self.release(
                            key,
                            Resolution::Unknown {
                                tx_hash: prior_submission,
                            },
                        )
                        .await;
                        return DispatchOutcome::FailedRetryable;
                    }
                }
            }
            Admission::Admitted => {}
        }

        let action = RelayAction::for_event(event);
        debug_assert_eq!(action.target, self.target.role());

        let tx_hash = match self.submit_action(&action).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                warn!(
                    %key,
                    target = %action.target,
                    function = %action.function,
                    error = %e,
                    "Submission failed before entering the chain, will retry"
                );
                let resolution = match unresolved_prior {
                    // The resubmission never entered the chain, but the
                    // earlier timed-out transaction may still land; the key
                    // must keep pointing at it so the next attempt rechecks.
                    Some(tx_hash) => Resolution::Unknown { tx_hash },
                    // Nothing was ever submitted for this key; the
                    // overlapping scan window re-delivers it next poll.
                    None => Resolution::Abandoned,
                };
                self.release(key, resolution).await;
                return DispatchOutcome::FailedRetryable;
            }
        };

        info!(
            %key,
            target = %action.target,
            function = %action.function,
            token = %action.token,
            recipient = %action.recipient,
            amount = %action.amount,
            %tx_hash,
            "Compensating transaction submitted"
        );

        match self
            .target
            .await_outcome(tx_hash, self.confirmation_timeout)
            .await
        {
            Ok(TxOutcome::Confirmed) => {
                info!(%key, %tx_hash, "Compensating transaction confirmed");
                self.release(key, Resolution::Settled).await;
                DispatchOutcome::Succeeded
            }
            Ok(TxOutcome::Reverted) => {
                // Operator intervention required: likely an unregistered
                // token or insufficient liquidity on the target chain.
                error!(
                    %key,
                    target = %action.target,
                    function = %action.function,
                    token = %action.token,
                    %tx_hash,
                    "Compensating transaction reverted, not retrying"
                );
                self.release(key, Resolution::FailedPermanent).await;
                DispatchOutcome::FailedPermanent
            }
            Ok(TxOutcome::TimedOut) => {
                warn!(
                    %key,
                    %tx_hash,
                    timeout_secs = self.confirmation_timeout.as_secs(),
                    "Confirmation timed out, outcome unknown"
                );
                self.release(key, Resolution::Unknown { tx_hash }).await;
                DispatchOutcome::FailedRetryable
            }
            Err(e) => {
                // The transaction was submitted; losing connectivity while
                // polling the receipt leaves its outcome unknown.
                warn!(%key, %tx_hash, error = %e, "Receipt polling failed, outcome unknown");
                self.release(key, Resolution::Unknown { tx_hash }).await;
                DispatchOutcome::FailedRetryable
            }
        }
    }

    /// Build, sign, and submit the compensating transaction.
    ///
    /// The nonce is read immediately before signing; with a single worker
    /// per target chain this yields strictly increasing nonces.
    async fn submit_action(&self, action: &RelayAction) -> Result<B256, RelayError> {
        let nonce = self.target.next_nonce(self.warden.address()).await?;
        let gas_price = self.target.fee_price().await?;

        let calldata = match action.function {
            RelayFunction::Wrap => Bridge::wrapCall {
                token: action.token,
                recipient: action.recipient,
                amount: action.amount,
            }
            .abi_encode(),
            RelayFunction::Withdraw => Bridge::withdrawCall {
                token: action.token,
                recipient: action.recipient,
                amount: action.amount,
            }
            .abi_encode(),
        };

        let mut tx = TxLegacy {
            chain_id: Some(self.target.chain_id()),
            nonce,
            gas_price,
            gas_limit: RELAY_GAS_LIMIT,
            to: TxKind::Call(self.target.bridge_address()),
            value: U256::ZERO,
            input: calldata.into(),
        };

        let signature = self
            .warden
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| RelayError::SubmissionRejected(format!("signing failed: {e}")))?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let raw = envelope.encoded_2718();

        self.target.submit(&raw).await
    }

    async fn release(&self, key: EventKey, resolution: Resolution) {
        self.guard.lock().await.release(key, resolution);
    }
}
