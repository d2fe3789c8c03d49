//! Ledger client: the read/write seam between the relay core and a chain.
//!
//! The trait is everything the scanner and dispatcher need from a ledger;
//! the production implementation speaks JSON-RPC through an alloy HTTP
//! provider. Tests substitute an in-memory ledger behind the same trait.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ChainConfig;
use crate::contracts::Bridge;
use crate::error::RelayError;
use crate::types::{BridgeEvent, ChainRole, EventKind, TxOutcome};

/// How often `await_outcome` polls for a receipt.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Read/write interface against one chain's bridge contract.
///
/// Two instances exist, one per [`ChainRole`]; both bind the same contract
/// interface. `fetch_events` returns an empty vec, not an error, when the
/// range holds no matching logs. `await_outcome` blocks until inclusion or
/// the timeout elapses and never retries internally.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn role(&self) -> ChainRole;

    fn chain_id(&self) -> u64;

    fn bridge_address(&self) -> Address;

    async fn current_height(&self) -> Result<u64, RelayError>;

    /// Fetch matching events in the inclusive block range, ordered by
    /// `(block_number, log_index)` ascending.
    async fn fetch_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BridgeEvent>, RelayError>;

    /// Next unused transaction sequence number for `address` as seen by this
    /// client's chain, counting mempool-resident transactions.
    async fn next_nonce(&self, address: Address) -> Result<u64, RelayError>;

    async fn fee_price(&self) -> Result<u128, RelayError>;

    /// Submit a raw signed payload; returns the submission hash.
    async fn submit(&self, raw_tx: &[u8]) -> Result<B256, RelayError>;

    /// Wait for the submission to be included and classify it.
    async fn await_outcome(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<TxOutcome, RelayError>;
}

/// JSON-RPC ledger client over an alloy HTTP provider.
pub struct EvmLedgerClient {
    role: ChainRole,
    provider: RootProvider<Http<Client>>,
    bridge_address: Address,
    chain_id: u64,
}

impl EvmLedgerClient {
    pub fn new(role: ChainRole, config: &ChainConfig) -> Result<Self, RelayError> {
        let url = config
            .rpc_url
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid RPC URL for {role}: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);

        let bridge_address = Address::from_str(&config.bridge_address).map_err(|e| {
            RelayError::Config(format!("invalid bridge address for {role}: {e}"))
        })?;

        Ok(Self {
            role,
            provider,
            bridge_address,
            chain_id: config.chain_id,
        })
    }

    /// Decode a raw log into a [`BridgeEvent`].
    fn decode_log(&self, kind: EventKind, log: &Log) -> Result<BridgeEvent, RelayError> {
        let (token, recipient, amount) = match kind {
            EventKind::Deposit => {
                let decoded = Bridge::Deposit::decode_log(&log.inner, true)
                    .map_err(|e| RelayError::Decode(format!("Deposit log: {e}")))?;
                (
                    decoded.data.token,
                    decoded.data.recipient,
                    decoded.data.amount,
                )
            }
            EventKind::Unwrap => {
                let decoded = Bridge::Unwrap::decode_log(&log.inner, true)
                    .map_err(|e| RelayError::Decode(format!("Unwrap log: {e}")))?;
                // The compensating withdraw releases the underlying asset,
                // not the wrapped representation that was burned.
                (
                    decoded.data.underlying_token,
                    decoded.data.to,
                    decoded.data.amount,
                )
            }
        };

        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| RelayError::Decode("missing transaction hash".into()))?;
        let block_number = log
            .block_number
            .ok_or_else(|| RelayError::Decode("missing block number".into()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| RelayError::Decode("missing log index".into()))?;

        Ok(BridgeEvent {
            origin: self.role,
            kind,
            token,
            recipient,
            amount,
            tx_hash,
            block_number,
            log_index,
        })
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    fn role(&self) -> ChainRole {
        self.role
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn bridge_address(&self) -> Address {
        self.bridge_address
    }

    async fn current_height(&self) -> Result<u64, RelayError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| RelayError::Connectivity(format!("get_block_number: {e}")))
    }

    async fn fetch_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BridgeEvent>, RelayError> {
        let filter = Filter::new()
            .address(self.bridge_address)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| RelayError::Connectivity(format!("get_logs: {e}")))?;

        let signature = match kind {
            EventKind::Deposit => Bridge::Deposit::SIGNATURE_HASH,
            EventKind::Unwrap => Bridge::Unwrap::SIGNATURE_HASH,
        };

        let mut events = Vec::new();
        for log in &logs {
            let topics = log.topics();
            if topics.first() != Some(&signature) {
                continue;
            }
            match self.decode_log(kind, log) {
                Ok(event) => events.push(event),
                // A malformed log is skipped, never fails the scan.
                Err(e) => warn!(
                    chain = %self.role,
                    tx_hash = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    error = %e,
                    "Skipping undecodable event log"
                ),
            }
        }

        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn next_nonce(&self, address: Address) -> Result<u64, RelayError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| RelayError::Connectivity(format!("get_transaction_count: {e}")))
    }

    async fn fee_price(&self) -> Result<u128, RelayError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| RelayError::Connectivity(format!("get_gas_price: {e}")))
    }

    async fn submit(&self, raw_tx: &[u8]) -> Result<B256, RelayError> {
        debug!(
            chain = %self.role,
            payload = %hex::encode(raw_tx),
            "Submitting raw transaction"
        );
        let pending = self
            .provider
            .send_raw_transaction(raw_tx)
            .await
            .map_err(|e| RelayError::SubmissionRejected(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn await_outcome(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<TxOutcome, RelayError> {
        let wait = tokio::time::timeout(timeout, async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        return if receipt.status() {
                            Ok(TxOutcome::Confirmed)
                        } else {
                            Ok(TxOutcome::Reverted)
                        };
                    }
                    Ok(None) => tokio::time::sleep(RECEIPT_POLL_INTERVAL).await,
                    Err(e) => {
                        return Err(RelayError::Connectivity(format!(
                            "get_transaction_receipt: {e}"
                        )))
                    }
                }
            }
        })
        .await;

        match wait {
            Ok(result) => result,
            Err(_) => Ok(TxOutcome::TimedOut),
        }
    }
}
