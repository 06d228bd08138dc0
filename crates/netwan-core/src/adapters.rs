//! Adapters (C1) — the narrow capability interfaces the rest of the core
//! calls. Host router implementations (shell/ubus, mock/simulated) live
//! outside this crate; this module only defines the contract.
//!
//! Every operation that touches the host fails with
//! [`CoreError::AdapterUnavailable`] when the underlying primitive is
//! missing, never with a panic — the core degrades to observation-only
//! rather than crashing when a host primitive disappears.

use std::time::Duration;

use async_trait::async_trait;
use netwan_types::error::CoreResult;
use serde_json::Value;

/// A member as reported directly by the host's multi-WAN policy, before
/// the registry has classified and merged it into a [`netwan_types::models::Member`].
#[derive(Debug, Clone)]
pub struct PolicyMember {
    pub name: String,
    pub class_hint: Option<String>,
    pub iface: String,
    pub weight: u32,
    pub metered: bool,
    pub prefer_roaming: bool,
    pub min_uptime_s: u32,
    pub cooldown_s: u32,
}

/// Result of a bounded shell execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: i32,
}

impl ExecOutput {
    pub fn succeeded(&self) -> bool {
        self.exit == 0
    }
}

/// Abstracts the host's routing-policy manager, RPC bus, config store, and
/// shell runner. The core never touches the filesystem, network, or host
/// commands except through this trait (the Starlink RPC client is the one
/// exception, wrapped by [`StarlinkClient`] so it stays mockable).
#[async_trait]
pub trait RouterAdapter: Send + Sync {
    async fn list_policy_members(&self) -> CoreResult<Vec<PolicyMember>>;

    /// Idempotent: calling with an unchanged weight must be safe and
    /// observably a no-op.
    async fn set_member_weight(&self, name: &str, weight: u32) -> CoreResult<()>;

    async fn set_member_metric(&self, iface: &str, metric: u32) -> CoreResult<()>;

    /// Triggers the host's policy reload; returns only once the reload is
    /// observable (not merely requested).
    async fn reload_policy(&self) -> CoreResult<()>;

    async fn config_get(&self, key: &str) -> CoreResult<Option<String>>;
    async fn config_set(&self, key: &str, value: &str) -> CoreResult<()>;
    async fn config_commit(&self, section: &str) -> CoreResult<()>;

    async fn bus_call(&self, service: &str, method: &str, payload: Value) -> CoreResult<Value>;

    async fn exec(&self, cmd: &str, args: &[String], timeout: Duration) -> CoreResult<ExecOutput>;
}

/// The subset of the Starlink gRPC `dish_get_status` response the collector
/// needs. Wrapped behind a trait so the collector is testable without a
/// real dish on the network.
#[derive(Debug, Clone, Default)]
pub struct StarlinkStatus {
    pub pop_ping_latency_ms: f64,
    pub pop_ping_drop_rate: f64,
    pub snr: i32,
    pub fraction_obstructed: f64,
    pub time_obstructed: f64,
    pub obstruction_valid_s: u32,
    pub avg_prolonged_obstruction_duration_s: f64,
    pub patches_valid: bool,
    pub thermal_throttle: bool,
    pub thermal_shutdown: bool,
    pub swupdate_reboot_ready: bool,
    pub swupdate_reboot_scheduled_utc: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait StarlinkClient: Send + Sync {
    async fn get_status(&self, iface: &str, timeout: Duration) -> CoreResult<StarlinkStatus>;
}
