//! Generic / LAN collector (§4.3.4) — an ICMP+TCP probe to two well-known
//! targets. This is also the universal fallback when a class-specific
//! collector hard-fails, so it deliberately has no adapter dependency.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use netwan_types::models::{ClassMetrics, Member, MetricSample};

use super::{tcp_probe, Collector};

pub struct GenericCollector {
    targets: Vec<String>,
}

impl GenericCollector {
    pub fn new(targets: Vec<String>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Collector for GenericCollector {
    async fn collect(&self, _member: &Member, timeout: Duration) -> MetricSample {
        let ts = Utc::now();
        let per_target_timeout = if self.targets.is_empty() {
            timeout
        } else {
            timeout / self.targets.len() as u32
        };

        let mut successes = 0usize;
        let mut total_rtt_ms = 0.0;

        for target in &self.targets {
            match tcp_probe(target, per_target_timeout).await {
                Some(rtt) => {
                    successes += 1;
                    total_rtt_ms += rtt.as_secs_f64() * 1000.0;
                }
                None => {}
            }
        }

        if self.targets.is_empty() || successes == 0 {
            return MetricSample::degraded(ts, ClassMetrics::Generic);
        }

        let loss_pct = 100.0 * (1.0 - successes as f64 / self.targets.len() as f64);
        MetricSample {
            ts,
            latency_ms: total_rtt_ms / successes as f64,
            loss_pct,
            jitter_ms: 0.0,
            reachable: true,
            link_up: true,
            class_metrics: ClassMetrics::Generic,
        }
    }
}
