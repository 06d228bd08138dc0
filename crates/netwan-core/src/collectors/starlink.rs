//! Starlink collector (§4.3.1) — primary path is a gRPC-style status call
//! to the dish; when that endpoint is unreachable, falls back to a plain
//! ICMP/TCP probe against a well-known anycast target and reports only the
//! common metric fields.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use netwan_types::models::{ClassMetrics, Member, MetricSample, StarlinkMetrics};
use tracing::debug;

use crate::adapters::StarlinkClient;

use super::{tcp_probe, Collector};

/// Anycast fallback target used when the dish's own status endpoint can't
/// be reached (e.g. a dish still in `Probe` bringing up its LAN side).
const FALLBACK_PROBE_TARGET: &str = "1.1.1.1:443";

pub struct StarlinkCollector {
    client: Arc<dyn StarlinkClient>,
}

impl StarlinkCollector {
    pub fn new(client: Arc<dyn StarlinkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Collector for StarlinkCollector {
    async fn collect(&self, member: &Member, timeout: Duration) -> MetricSample {
        let ts = Utc::now();

        match self.client.get_status(&member.iface, timeout).await {
            Ok(status) => MetricSample {
                ts,
                latency_ms: status.pop_ping_latency_ms,
                loss_pct: (status.pop_ping_drop_rate * 100.0).clamp(0.0, 100.0),
                jitter_ms: 0.0,
                reachable: true,
                link_up: true,
                class_metrics: ClassMetrics::Starlink(StarlinkMetrics {
                    obstruction_pct: (status.fraction_obstructed * 100.0).clamp(0.0, 100.0),
                    obstruction_time_pct: (status.time_obstructed * 100.0).clamp(0.0, 100.0),
                    obstruction_valid_s: status.obstruction_valid_s,
                    obstruction_patches_valid: status.patches_valid,
                    snr_db: status.snr,
                    thermal_throttle: status.thermal_throttle,
                    thermal_shutdown: status.thermal_shutdown,
                    swupdate_reboot_ready: status.swupdate_reboot_ready,
                    reboot_scheduled_utc: status.swupdate_reboot_scheduled_utc,
                }),
            },
            Err(err) => {
                debug!(member = %member.name, error = %err, "starlink status unreachable, falling back to probe");
                match tcp_probe(FALLBACK_PROBE_TARGET, timeout).await {
                    Some(rtt) => MetricSample {
                        ts,
                        latency_ms: rtt.as_secs_f64() * 1000.0,
                        loss_pct: 0.0,
                        jitter_ms: 0.0,
                        reachable: true,
                        link_up: true,
                        class_metrics: ClassMetrics::Starlink(StarlinkMetrics::default()),
                    },
                    None => MetricSample::degraded(
                        ts,
                        ClassMetrics::Starlink(StarlinkMetrics::default()),
                    ),
                }
            }
        }
    }
}
