//! Configuration loading.
//!
//! Chain endpoints, contract addresses, and the warden key come from a JSON
//! contract-info file (path from `CONTRACT_INFO`, default
//! `contract_info.json`); relay tuning comes from environment variables with
//! defaults, `.env` supported. Any missing or invalid piece of the contract
//! info, including the warden key, is fatal before the poll loop starts.

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONTRACT_INFO: &str = "contract_info.json";

/// Main configuration for the relay.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: ChainConfig,
    pub destination: ChainConfig,
    pub warden_key: WardenKey,
    pub relay: RelayConfig,
}

/// Per-chain endpoint and contract binding.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub bridge_address: String,
    pub chain_id: u64,
}

/// Warden signing key material. Wrapped so it can never leak through Debug.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct WardenKey(pub String);

impl fmt::Debug for WardenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Relay tuning, from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub scan_window: u64,
    pub max_retry_attempts: u32,
}

/// On-disk shape of the contract-info file.
#[derive(Debug, Deserialize)]
struct ContractInfoFile {
    source: ChainConfig,
    destination: ChainConfig,
    warden_key: Option<WardenKey>,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_scan_window() -> u64 {
    crate::scanner::SCAN_WINDOW
}

fn default_max_retry_attempts() -> u32 {
    3
}

impl Config {
    /// Load configuration: `.env` if present, then the contract-info file,
    /// then relay tuning from the environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path =
            env::var("CONTRACT_INFO").unwrap_or_else(|_| DEFAULT_CONTRACT_INFO.to_string());
        Self::load_from_file(&path)
    }

    /// Load from a specific contract-info file path.
    pub fn load_from_file(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(eyre!("contract info file not found: {path}"));
        }
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read contract info from {path}"))?;
        let info: ContractInfoFile = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse contract info from {path}"))?;

        // Credential absence is always fatal at startup.
        let warden_key = info
            .warden_key
            .ok_or_else(|| eyre!("warden_key missing from {path}"))?;

        let relay = RelayConfig {
            poll_interval: Duration::from_millis(
                env_parse("POLL_INTERVAL_MS").unwrap_or_else(default_poll_interval_ms),
            ),
            confirmation_timeout: Duration::from_secs(
                env_parse("CONFIRMATION_TIMEOUT_SECS")
                    .unwrap_or_else(default_confirmation_timeout_secs),
            ),
            scan_window: env_parse("SCAN_WINDOW").unwrap_or_else(default_scan_window),
            max_retry_attempts: env_parse("MAX_RETRY_ATTEMPTS")
                .unwrap_or_else(default_max_retry_attempts),
        };

        let config = Config {
            source: info.source,
            destination: info.destination,
            warden_key,
            relay,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.warden_key.0.trim().is_empty() {
            return Err(eyre!("warden_key cannot be empty"));
        }
        for (role, chain) in [("source", &self.source), ("destination", &self.destination)] {
            if chain.rpc_url.is_empty() {
                return Err(eyre!("{role}.rpc_url cannot be empty"));
            }
            if !chain.rpc_url.starts_with("http://") && !chain.rpc_url.starts_with("https://") {
                return Err(eyre!("{role}.rpc_url must be an http(s) URL"));
            }
            if chain.bridge_address.is_empty() {
                return Err(eyre!("{role}.bridge_address cannot be empty"));
            }
        }
        if self.source.chain_id == self.destination.chain_id {
            return Err(eyre!(
                "source and destination must be distinct chains (both have chain_id {})",
                self.source.chain_id
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
