//! Warden relay: watches Deposit events on the source chain and Unwrap
//! events on the destination chain, and submits the compensating
//! wrap/withdraw call on the opposite chain, signed by the warden key.

pub mod client;
pub mod config;
pub mod contracts;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod relay;
pub mod retry;
pub mod scanner;
pub mod types;
