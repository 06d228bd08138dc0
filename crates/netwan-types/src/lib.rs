//! Shared types for the multi-WAN failover daemon.
//!
//! This crate contains:
//! - **Data models** — Member, MetricSample, Score, DecisionRecord, Pattern, RootCause
//! - **Config** — the closed `DaemonConfig` struct loaded from TOML
//! - **Errors** — the shared `CoreError` taxonomy
//! - **RPC shapes** — request/response types for the local RPC surface
//! - **ID generation** — prefixed UUIDv7 helpers (`mem_`, `dec_`, `pat_`, `rc_`)

pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod rpc;
