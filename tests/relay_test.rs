//! Relay core tests against an in-memory ledger.
//!
//! Run with: cargo test --test relay_test
//!
//! The mock ledger scripts per-submission outcomes so the dispatcher's
//! classification, dedup, and recheck paths can be driven deterministically
//! without a running chain.

use alloy::consensus::{TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{address, keccak256, Address, TxKind, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use warden_relay::client::LedgerClient;
use warden_relay::contracts::Bridge;
use warden_relay::dedup::DedupGuard;
use warden_relay::dispatcher::{Dispatcher, SharedGuard, WardenIdentity};
use warden_relay::error::RelayError;
use warden_relay::scanner::WindowScanner;
use warden_relay::types::{BridgeEvent, ChainRole, DispatchOutcome, EventKind, TxOutcome};

/// Well-known local test key (anvil account 1).
const TEST_WARDEN_KEY: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

const TOKEN: Address = address!("00000000000000000000000000000000000000aa");
const RECIPIENT: Address = address!("00000000000000000000000000000000000000bb");
const BRIDGE: Address = address!("000000000000000000000000000000000000b21d");

#[derive(Default)]
struct MockState {
    height: u64,
    events: Vec<BridgeEvent>,
    base_nonce: u64,
    /// Raw signed payloads, in submission order.
    submissions: Vec<Vec<u8>>,
    /// Outcome script assigned to each future submission, in order. Each
    /// inner list is consumed one entry per `await_outcome` call, with the
    /// last entry sticking.
    submission_scripts: Vec<Vec<TxOutcome>>,
    outcomes: HashMap<B256, Vec<TxOutcome>>,
    /// When set, `submit` rejects synchronously without recording anything.
    reject_submissions: bool,
    /// Ranges passed to `fetch_events`, for scan-window assertions.
    fetch_calls: Vec<(u64, u64)>,
}

struct MockLedger {
    role: ChainRole,
    state: Mutex<MockState>,
}

impl MockLedger {
    fn new(role: ChainRole, height: u64) -> Arc<Self> {
        Arc::new(Self {
            role,
            state: Mutex::new(MockState {
                height,
                ..Default::default()
            }),
        })
    }

    fn push_event(&self, event: BridgeEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    /// Script the outcome sequence for the next submissions, in order.
    fn script_outcomes(&self, scripts: Vec<Vec<TxOutcome>>) {
        self.state.lock().unwrap().submission_scripts = scripts;
    }

    fn set_reject_submissions(&self, reject: bool) {
        self.state.lock().unwrap().reject_submissions = reject;
    }

    fn submissions(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn fetch_calls(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().fetch_calls.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn role(&self) -> ChainRole {
        self.role
    }

    fn chain_id(&self) -> u64 {
        match self.role {
            ChainRole::Source => 43113,
            ChainRole::Destination => 97,
        }
    }

    fn bridge_address(&self) -> Address {
        BRIDGE
    }

    async fn current_height(&self) -> Result<u64, RelayError> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn fetch_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BridgeEvent>, RelayError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls.push((from_block, to_block));
        Ok(state
            .events
            .iter()
            .filter(|e| e.kind == kind && e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn next_nonce(&self, _address: Address) -> Result<u64, RelayError> {
        let state = self.state.lock().unwrap();
        Ok(state.base_nonce + state.submissions.len() as u64)
    }

    async fn fee_price(&self) -> Result<u128, RelayError> {
        Ok(1_000_000_000)
    }

    async fn submit(&self, raw_tx: &[u8]) -> Result<B256, RelayError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_submissions {
            return Err(RelayError::SubmissionRejected("insufficient funds".into()));
        }
        let hash = keccak256(raw_tx);
        let script = if state.submission_scripts.is_empty() {
            vec![TxOutcome::Confirmed]
        } else {
            state.submission_scripts.remove(0)
        };
        state.outcomes.insert(hash, script);
        state.submissions.push(raw_tx.to_vec());
        Ok(hash)
    }

    async fn await_outcome(
        &self,
        tx_hash: B256,
        _timeout: Duration,
    ) -> Result<TxOutcome, RelayError> {
        let mut state = self.state.lock().unwrap();
        match state.outcomes.get_mut(&tx_hash) {
            Some(script) if script.len() > 1 => Ok(script.remove(0)),
            Some(script) => Ok(*script.first().unwrap_or(&TxOutcome::Confirmed)),
            None => Ok(TxOutcome::TimedOut),
        }
    }
}

fn deposit_event(tx_byte: u8, block_number: u64, log_index: u64) -> BridgeEvent {
    BridgeEvent {
        origin: ChainRole::Source,
        kind: EventKind::Deposit,
        token: TOKEN,
        recipient: RECIPIENT,
        amount: U256::from(100u64),
        tx_hash: B256::with_last_byte(tx_byte),
        block_number,
        log_index,
    }
}

fn new_guard() -> SharedGuard {
    Arc::new(tokio::sync::Mutex::new(DedupGuard::default()))
}

fn dispatcher_for(target: Arc<MockLedger>, guard: SharedGuard) -> Dispatcher {
    let warden = WardenIdentity::from_key(TEST_WARDEN_KEY).unwrap();
    Dispatcher::new(target, warden, guard, Duration::from_secs(120))
}

fn decode_submission(raw: &[u8]) -> TxLegacy {
    let envelope = TxEnvelope::decode_2718(&mut &raw[..]).expect("valid signed payload");
    match envelope {
        TxEnvelope::Legacy(signed) => signed.tx().clone(),
        other => panic!("expected legacy transaction, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deposit_produces_exactly_one_wrap() {
    let source = MockLedger::new(ChainRole::Source, 10);
    let destination = MockLedger::new(ChainRole::Destination, 20);
    source.push_event(deposit_event(1, 10, 0));

    let guard = new_guard();
    let scanner = WindowScanner::new(source.clone() as Arc<dyn LedgerClient>);
    let dispatcher = dispatcher_for(destination.clone(), guard.clone());

    let events = scanner.scan().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        dispatcher.dispatch(&events[0]).await,
        DispatchOutcome::Succeeded
    );

    let submissions = destination.submissions();
    assert_eq!(submissions.len(), 1);

    let tx = decode_submission(&submissions[0]);
    assert_eq!(tx.to, TxKind::Call(BRIDGE));
    assert_eq!(tx.chain_id, Some(97));
    let call = Bridge::wrapCall::abi_decode(tx.input.as_ref(), true).unwrap();
    assert_eq!(call.token, TOKEN);
    assert_eq!(call.recipient, RECIPIENT);
    assert_eq!(call.amount, U256::from(100u64));

    // Re-scanning the same window re-discovers the identical event; it must
    // not produce another submission.
    let events = scanner.scan().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        dispatcher.dispatch(&events[0]).await,
        DispatchOutcome::SkippedDuplicate
    );
    assert_eq!(destination.submissions().len(), 1);
}

#[tokio::test]
async fn test_unwrap_produces_withdraw_on_source() {
    let source = MockLedger::new(ChainRole::Source, 10);
    let guard = new_guard();
    let dispatcher = dispatcher_for(source.clone(), guard);

    let event = BridgeEvent {
        origin: ChainRole::Destination,
        kind: EventKind::Unwrap,
        token: TOKEN,
        recipient: RECIPIENT,
        amount: U256::from(42u64),
        tx_hash: B256::with_last_byte(9),
        block_number: 19,
        log_index: 2,
    };
    assert_eq!(dispatcher.dispatch(&event).await, DispatchOutcome::Succeeded);

    let submissions = source.submissions();
    assert_eq!(submissions.len(), 1);
    let tx = decode_submission(&submissions[0]);
    assert_eq!(tx.chain_id, Some(43113));
    let call = Bridge::withdrawCall::abi_decode(tx.input.as_ref(), true).unwrap();
    assert_eq!(call.token, TOKEN);
    assert_eq!(call.recipient, RECIPIENT);
    assert_eq!(call.amount, U256::from(42u64));
}

#[tokio::test]
async fn test_reverted_event_does_not_block_batch() {
    let destination = MockLedger::new(ChainRole::Destination, 20);
    destination.script_outcomes(vec![
        vec![TxOutcome::Confirmed],
        vec![TxOutcome::Reverted],
        vec![TxOutcome::Confirmed],
    ]);

    let guard = new_guard();
    let dispatcher = dispatcher_for(destination.clone(), guard);

    let batch = [
        deposit_event(1, 10, 0),
        deposit_event(2, 10, 1),
        deposit_event(3, 11, 0),
    ];
    let mut outcomes = Vec::new();
    for event in &batch {
        outcomes.push(dispatcher.dispatch(event).await);
    }

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Succeeded,
            DispatchOutcome::FailedPermanent,
            DispatchOutcome::Succeeded,
        ]
    );
    assert_eq!(destination.submissions().len(), 3);

    // The reverted event stays failed; no silent retry.
    assert_eq!(
        dispatcher.dispatch(&batch[1]).await,
        DispatchOutcome::SkippedDuplicate
    );
    assert_eq!(destination.submissions().len(), 3);
}

#[tokio::test]
async fn test_nonces_strictly_increase_across_queue() {
    let destination = MockLedger::new(ChainRole::Destination, 20);
    {
        destination.state.lock().unwrap().base_nonce = 7;
    }
    let guard = new_guard();
    let dispatcher = dispatcher_for(destination.clone(), guard);

    for n in 1..=4u8 {
        let outcome = dispatcher.dispatch(&deposit_event(n, 10, n as u64)).await;
        assert_eq!(outcome, DispatchOutcome::Succeeded);
    }

    let nonces: Vec<u64> = destination
        .submissions()
        .iter()
        .map(|raw| decode_submission(raw).nonce)
        .collect();
    assert_eq!(nonces, vec![7, 8, 9, 10]);
}

#[tokio::test]
async fn test_timeout_then_confirm_is_not_resubmitted() {
    let destination = MockLedger::new(ChainRole::Destination, 20);
    // First await times out; the recheck on the next admission confirms.
    destination.script_outcomes(vec![vec![TxOutcome::TimedOut, TxOutcome::Confirmed]]);

    let guard = new_guard();
    let dispatcher = dispatcher_for(destination.clone(), guard);
    let event = deposit_event(1, 10, 0);

    assert_eq!(
        dispatcher.dispatch(&event).await,
        DispatchOutcome::FailedRetryable
    );
    assert_eq!(destination.submissions().len(), 1);

    // Retry path: outcome recheck finds the original confirmed, so the event
    // settles without a second submission.
    assert_eq!(dispatcher.dispatch(&event).await, DispatchOutcome::Succeeded);
    assert_eq!(destination.submissions().len(), 1);

    // And the key is now settled for good.
    assert_eq!(
        dispatcher.dispatch(&event).await,
        DispatchOutcome::SkippedDuplicate
    );
}

#[tokio::test]
async fn test_timeout_then_still_unknown_resubmits_within_budget() {
    let destination = MockLedger::new(ChainRole::Destination, 20);
    // Original submission never resolves; the replacement confirms.
    destination.script_outcomes(vec![
        vec![TxOutcome::TimedOut, TxOutcome::TimedOut],
        vec![TxOutcome::Confirmed],
    ]);

    let guard = new_guard();
    let dispatcher = dispatcher_for(destination.clone(), guard);
    let event = deposit_event(1, 10, 0);

    assert_eq!(
        dispatcher.dispatch(&event).await,
        DispatchOutcome::FailedRetryable
    );
    assert_eq!(dispatcher.dispatch(&event).await, DispatchOutcome::Succeeded);
    assert_eq!(destination.submissions().len(), 2);
}

#[tokio::test]
async fn test_rejected_submission_retries_immediately() {
    let destination = MockLedger::new(ChainRole::Destination, 20);
    destination.set_reject_submissions(true);

    let guard = new_guard();
    let dispatcher = dispatcher_for(destination.clone(), guard);
    let event = deposit_event(1, 10, 0);

    assert_eq!(
        dispatcher.dispatch(&event).await,
        DispatchOutcome::FailedRetryable
    );
    assert_eq!(destination.submissions().len(), 0);

    // Nothing entered the chain, so the key was forgotten and the event is
    // admissible as soon as it is re-observed.
    destination.set_reject_submissions(false);
    assert_eq!(dispatcher.dispatch(&event).await, DispatchOutcome::Succeeded);
    assert_eq!(destination.submissions().len(), 1);
}

#[tokio::test]
async fn test_rejected_resubmit_keeps_recheck_of_timed_out_prior() {
    let destination = MockLedger::new(ChainRole::Destination, 20);
    // The original submission times out, is still unconfirmed when the retry
    // rechecks it, and finally confirms on its own.
    destination.script_outcomes(vec![vec![
        TxOutcome::TimedOut,
        TxOutcome::TimedOut,
        TxOutcome::Confirmed,
    ]]);

    let guard = new_guard();
    let dispatcher = dispatcher_for(destination.clone(), guard);
    let event = deposit_event(1, 10, 0);

    assert_eq!(
        dispatcher.dispatch(&event).await,
        DispatchOutcome::FailedRetryable
    );
    assert_eq!(destination.submissions().len(), 1);

    // The retry rechecks, finds the original still unconfirmed, and its
    // replacement is rejected at the node. The original may yet land, so the
    // key must keep pointing at it.
    destination.set_reject_submissions(true);
    assert_eq!(
        dispatcher.dispatch(&event).await,
        DispatchOutcome::FailedRetryable
    );
    assert_eq!(destination.submissions().len(), 1);

    // Next poll: the original has confirmed in the meantime. The recheck must
    // discover that and settle without ever submitting a second payout.
    destination.set_reject_submissions(false);
    assert_eq!(dispatcher.dispatch(&event).await, DispatchOutcome::Succeeded);
    assert_eq!(destination.submissions().len(), 1);
}

#[tokio::test]
async fn test_scan_window_clamps_to_genesis() {
    let source = MockLedger::new(ChainRole::Source, 3);
    let scanner = WindowScanner::new(source.clone() as Arc<dyn LedgerClient>);

    scanner.scan().await.unwrap();
    assert_eq!(source.fetch_calls(), vec![(0, 3)]);
}

#[tokio::test]
async fn test_scan_orders_by_block_then_log_index() {
    let source = MockLedger::new(ChainRole::Source, 12);
    source.push_event(deposit_event(3, 12, 1));
    source.push_event(deposit_event(1, 10, 0));
    source.push_event(deposit_event(2, 12, 0));

    let scanner = WindowScanner::new(source.clone() as Arc<dyn LedgerClient>);
    let events = scanner.scan().await.unwrap();

    let order: Vec<(u64, u64)> = events
        .iter()
        .map(|e| (e.block_number, e.log_index))
        .collect();
    assert_eq!(order, vec![(10, 0), (12, 0), (12, 1)]);
}

#[tokio::test]
async fn test_same_pair_ordering_preserved_through_dispatch() {
    let source = MockLedger::new(ChainRole::Source, 12);
    let destination = MockLedger::new(ChainRole::Destination, 20);
    // Two transfers for the same (token, recipient), out of order on arrival.
    source.push_event(deposit_event(2, 12, 0));
    source.push_event(deposit_event(1, 10, 0));

    let guard = new_guard();
    let scanner = WindowScanner::new(source.clone() as Arc<dyn LedgerClient>);
    let dispatcher = dispatcher_for(destination.clone(), guard);

    for event in scanner.scan().await.unwrap() {
        dispatcher.dispatch(&event).await;
    }

    // The earlier event's wrap was signed with the earlier nonce.
    let submissions = destination.submissions();
    assert_eq!(submissions.len(), 2);
    assert!(decode_submission(&submissions[0]).nonce < decode_submission(&submissions[1]).nonce);
}
