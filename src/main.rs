use std::sync::Arc;

use warden_relay::client::EvmLedgerClient;
use warden_relay::config::Config;
use warden_relay::dispatcher::WardenIdentity;
use warden_relay::relay::{RelayService, RunMode};
use warden_relay::types::ChainRole;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting warden relay");

    // Thin CLI adapter: which chain(s) to watch, default both.
    let mode: RunMode = std::env::args()
        .nth(1)
        .as_deref()
        .unwrap_or("both")
        .parse()?;

    // Any configuration failure (including a missing warden key) is fatal
    // before the poll loop starts.
    let config = Config::load()?;
    tracing::info!(
        source_chain_id = config.source.chain_id,
        destination_chain_id = config.destination.chain_id,
        mode = ?mode,
        "Configuration loaded"
    );

    let warden = WardenIdentity::from_key(&config.warden_key.0)?;
    tracing::info!(warden_address = %warden.address(), "Warden credential loaded");

    let source: Arc<dyn warden_relay::client::LedgerClient> =
        Arc::new(EvmLedgerClient::new(ChainRole::Source, &config.source)?);
    let destination: Arc<dyn warden_relay::client::LedgerClient> = Arc::new(
        EvmLedgerClient::new(ChainRole::Destination, &config.destination)?,
    );

    let service = RelayService::new(source, destination, warden, config.relay.clone());

    // Shutdown channel fed by SIGINT/SIGTERM.
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    service.run(mode, shutdown_rx).await?;

    tracing::info!("Warden relay stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,warden_relay=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
