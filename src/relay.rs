//! Poll loop orchestrator.
//!
//! One scan loop per watched chain and one dispatch worker per target chain,
//! connected by an mpsc channel. The single worker per target serializes
//! submissions from the warden address on that chain, which keeps nonce
//! assignment safe; the two directions run in parallel because they use
//! independent nonce sequences.

use eyre::Result;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::client::LedgerClient;
use crate::config::RelayConfig;
use crate::dedup::DedupGuard;
use crate::dispatcher::{Dispatcher, SharedGuard, WardenIdentity};
use crate::retry::RetryConfig;
use crate::scanner::WindowScanner;
use crate::types::{BridgeEvent, ChainRole, DispatchOutcome};

/// Which chain(s) to watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Source,
    Destination,
    Both,
}

impl RunMode {
    fn watched_roles(self) -> Vec<ChainRole> {
        match self {
            RunMode::Source => vec![ChainRole::Source],
            RunMode::Destination => vec![ChainRole::Destination],
            RunMode::Both => vec![ChainRole::Source, ChainRole::Destination],
        }
    }
}

impl FromStr for RunMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" => Ok(RunMode::Source),
            "destination" => Ok(RunMode::Destination),
            "both" => Ok(RunMode::Both),
            other => Err(eyre::eyre!(
                "invalid chain: {other} (expected source, destination, or both)"
            )),
        }
    }
}

/// Ties the scanners, dispatch workers, and dedup guard together.
pub struct RelayService {
    source: Arc<dyn LedgerClient>,
    destination: Arc<dyn LedgerClient>,
    warden: WardenIdentity,
    guard: SharedGuard,
    relay_config: RelayConfig,
    retry_config: RetryConfig,
}

impl RelayService {
    pub fn new(
        source: Arc<dyn LedgerClient>,
        destination: Arc<dyn LedgerClient>,
        warden: WardenIdentity,
        relay_config: RelayConfig,
    ) -> Self {
        let guard: SharedGuard = Arc::new(Mutex::new(DedupGuard::new(
            100_000,
            Duration::from_secs(3_600),
            Duration::from_secs(86_400),
            relay_config.max_retry_attempts,
        )));
        Self {
            source,
            destination,
            warden,
            guard,
            relay_config,
            retry_config: RetryConfig::default(),
        }
    }

    fn client(&self, role: ChainRole) -> Arc<dyn LedgerClient> {
        match role {
            ChainRole::Source => Arc::clone(&self.source),
            ChainRole::Destination => Arc::clone(&self.destination),
        }
    }

    /// Run the poll loop for the selected chain(s) until shutdown.
    ///
    /// Returns an error only if a relay task exits unexpectedly; per-event
    /// and per-scan failures are absorbed inside the loops.
    pub async fn run(&self, mode: RunMode, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut join_set = JoinSet::new();

        for watched in mode.watched_roles() {
            let target = watched.counterpart();
            let (event_tx, event_rx) = mpsc::channel::<BridgeEvent>(256);

            let dispatcher = Dispatcher::new(
                self.client(target),
                self.warden.clone(),
                Arc::clone(&self.guard),
                self.relay_config.confirmation_timeout,
            );
            join_set.spawn(dispatch_worker(target, dispatcher, event_rx));

            let scanner =
                WindowScanner::with_window(self.client(watched), self.relay_config.scan_window);
            let poll_interval = self.relay_config.poll_interval;
            let retry = self.retry_config.clone();
            join_set.spawn(scan_loop(watched, scanner, event_tx, poll_interval, retry));

            info!(watched = %watched, target = %target, "Relay direction started");
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping relay");
                join_set.abort_all();
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(())) => {
                        error!("A relay task exited unexpectedly");
                        Err(eyre::eyre!("relay task exited unexpectedly"))
                    }
                    Some(Err(e)) => {
                        error!("A relay task panicked: {:?}", e);
                        Err(eyre::eyre!("relay task panicked: {e}"))
                    }
                    None => Err(eyre::eyre!("no relay tasks were started")),
                }
            }
        }
    }
}

/// Scan one chain on a fixed interval and feed discovered events to the
/// counterpart chain's dispatch worker.
///
/// Scan failures back off exponentially and never terminate the loop.
async fn scan_loop(
    watched: ChainRole,
    scanner: WindowScanner,
    event_tx: mpsc::Sender<BridgeEvent>,
    poll_interval: Duration,
    retry: RetryConfig,
) {
    let mut consecutive_failures = 0u32;
    let mut cycle_count = 0u64;

    loop {
        cycle_count += 1;
        // Periodic heartbeat so a quiet chain is distinguishable from a
        // stuck loop.
        if cycle_count % 12 == 1 {
            info!(
                chain = %watched,
                cycle = cycle_count,
                consecutive_failures,
                "Scan loop heartbeat"
            );
        }

        match scanner.scan().await {
            Ok(events) => {
                consecutive_failures = 0;
                for event in events {
                    debug!(
                        chain = %watched,
                        key = %event.key(),
                        kind = %event.kind,
                        "Forwarding event for dispatch"
                    );
                    if event_tx.send(event).await.is_err() {
                        // Worker gone; the service is shutting down.
                        return;
                    }
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                let backoff = retry.backoff_for_attempt(consecutive_failures.saturating_sub(1));
                warn!(
                    chain = %watched,
                    error = %e,
                    consecutive_failures,
                    backoff_secs = backoff.as_secs(),
                    "Scan failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Drain the event queue for one target chain, strictly in arrival order.
async fn dispatch_worker(
    target: ChainRole,
    dispatcher: Dispatcher,
    mut event_rx: mpsc::Receiver<BridgeEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        let key = event.key();
        match dispatcher.dispatch(&event).await {
            DispatchOutcome::Succeeded => {}
            DispatchOutcome::SkippedDuplicate => {}
            DispatchOutcome::FailedPermanent => {
                // Already logged at error level by the dispatcher; counted
                // here so the failure is visible per target chain.
                warn!(target = %target, %key, "Event permanently failed");
            }
            DispatchOutcome::FailedRetryable => {
                debug!(target = %target, %key, "Event deferred for retry");
            }
        }
    }
}
