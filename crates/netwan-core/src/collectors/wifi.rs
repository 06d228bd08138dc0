//! Wi-Fi collector (§4.3.3) — signal strength and noise floor come from
//! `/proc/net/wireless` (no adapter needed, a pure host read); channel,
//! frequency, and link quality come from `iw dev <iface> link`/`info`
//! through the shell adapter, since that information isn't exposed by the
//! pseudo-file on most drivers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use netwan_types::models::{ClassMetrics, Member, MetricSample, WifiMetrics};

use crate::adapters::RouterAdapter;
use crate::net::signal::read_signal_and_noise_dbm;

use super::Collector;

pub struct WifiCollector {
    adapter: Arc<dyn RouterAdapter>,
}

impl WifiCollector {
    pub fn new(adapter: Arc<dyn RouterAdapter>) -> Self {
        Self { adapter }
    }
}

/// Weight contributed by a neighbouring AP's RSSI to channel congestion,
/// per §4.3.3's bucketing.
pub fn neighbor_weight(rssi_dbm: f64) -> u32 {
    if rssi_dbm >= -60.0 {
        30
    } else if rssi_dbm >= -70.0 {
        20
    } else if rssi_dbm >= -80.0 {
        10
    } else {
        5
    }
}

fn parse_iw_link(output: &str) -> (f64, Option<f64>) {
    // Lines of interest: "signal: -54 dBm", "tx bitrate: 120.0 MBit/s"
    let mut quality_pct = 0.0;
    let mut throughput_kbps = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("signal:") {
            if let Some(token) = rest.split_whitespace().next() {
                if let Ok(dbm) = token.parse::<f64>() {
                    // Map -30..-90 dBm onto 100..0 quality, the common
                    // driver convention when no direct quality field exists.
                    quality_pct = ((dbm + 90.0) / 60.0 * 100.0).clamp(0.0, 100.0);
                }
            }
        } else if let Some(rest) = line.strip_prefix("tx bitrate:") {
            if let Some(token) = rest.split_whitespace().next() {
                if let Ok(mbit) = token.parse::<f64>() {
                    throughput_kbps = Some(mbit * 1000.0);
                }
            }
        }
    }
    (quality_pct, throughput_kbps)
}

fn parse_iw_info(output: &str) -> (u32, u32) {
    // Line of interest: "channel 36 (5180 MHz), width: 80 MHz"
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("channel") {
            let mut parts = rest.split_whitespace();
            let channel = parts.next().and_then(|c| c.parse::<u32>().ok()).unwrap_or(0);
            let freq = rest
                .split('(')
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|f| f.parse::<u32>().ok())
                .unwrap_or(0);
            return (channel, freq);
        }
    }
    (0, 0)
}

#[async_trait]
impl Collector for WifiCollector {
    async fn collect(&self, member: &Member, timeout: Duration) -> MetricSample {
        let ts = Utc::now();
        let iface = member.iface.clone();

        let signal_and_noise = {
            let iface = iface.clone();
            tokio::task::spawn_blocking(move || read_signal_and_noise_dbm(&iface))
                .await
                .unwrap_or(None)
        };

        let Some((signal_dbm, noise_dbm)) = signal_and_noise else {
            return MetricSample::degraded(ts, ClassMetrics::Wifi(WifiMetrics::default()));
        };

        let link_args = vec!["dev".to_string(), iface.clone(), "link".to_string()];
        let info_args = vec!["dev".to_string(), iface.clone(), "info".to_string()];

        let (quality_pct, throughput_kbps) = match self.adapter.exec("iw", &link_args, timeout).await {
            Ok(out) if out.succeeded() => parse_iw_link(&out.stdout),
            _ => (0.0, None),
        };
        let (channel, frequency_mhz) = match self.adapter.exec("iw", &info_args, timeout).await {
            Ok(out) if out.succeeded() => parse_iw_info(&out.stdout),
            _ => (0, 0),
        };

        MetricSample {
            ts,
            latency_ms: 0.0,
            loss_pct: 0.0,
            jitter_ms: 0.0,
            reachable: true,
            link_up: true,
            class_metrics: ClassMetrics::Wifi(WifiMetrics {
                signal_strength_dbm: signal_dbm,
                noise_level_dbm: noise_dbm,
                quality_pct,
                channel,
                frequency_mhz,
                throughput_kbps,
            }),
        }
    }
}
