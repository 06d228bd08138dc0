//! Simulated router adapter for `--simulate` / local development — no real
//! ubus, uci, or dish on the network. Generates realistic-but-fake values
//! with small jitter, the same shape `HardwareScanner`'s simulated scan
//! uses upstream, so a dev box looks enough like a field router to exercise
//! the whole decision pipeline.

use std::time::Duration;

use async_trait::async_trait;
use netwan_types::error::CoreResult;
use rand::Rng;
use serde_json::{json, Value};
use tracing::debug;

use netwan_core::adapters::{ExecOutput, PolicyMember, RouterAdapter, StarlinkClient, StarlinkStatus};

pub struct MockAdapter {
    members: Vec<PolicyMember>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            members: vec![
                PolicyMember {
                    name: "wan_sl".into(),
                    class_hint: Some("starlink".into()),
                    iface: "stl0".into(),
                    weight: 100,
                    metered: false,
                    prefer_roaming: false,
                    min_uptime_s: 10,
                    cooldown_s: 20,
                },
                PolicyMember {
                    name: "wan_lte".into(),
                    class_hint: Some("cellular".into()),
                    iface: "wwan0".into(),
                    weight: 80,
                    metered: true,
                    prefer_roaming: false,
                    min_uptime_s: 10,
                    cooldown_s: 20,
                },
                PolicyMember {
                    name: "wan_wifi".into(),
                    class_hint: Some("wifi".into()),
                    iface: "wlan0".into(),
                    weight: 50,
                    metered: false,
                    prefer_roaming: false,
                    min_uptime_s: 10,
                    cooldown_s: 20,
                },
            ],
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouterAdapter for MockAdapter {
    async fn list_policy_members(&self) -> CoreResult<Vec<PolicyMember>> {
        Ok(self.members.clone())
    }

    async fn set_member_weight(&self, name: &str, weight: u32) -> CoreResult<()> {
        debug!(member = name, weight, "simulated set_member_weight");
        Ok(())
    }

    async fn set_member_metric(&self, iface: &str, metric: u32) -> CoreResult<()> {
        debug!(iface, metric, "simulated set_member_metric");
        Ok(())
    }

    async fn reload_policy(&self) -> CoreResult<()> {
        debug!("simulated reload_policy");
        Ok(())
    }

    async fn config_get(&self, _key: &str) -> CoreResult<Option<String>> {
        Ok(None)
    }

    async fn config_set(&self, _key: &str, _value: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn config_commit(&self, _section: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn bus_call(&self, service: &str, method: &str, _payload: Value) -> CoreResult<Value> {
        if service == "modemmanager" && method == "GetSignal" {
            let mut rng = rand::rng();
            return Ok(json!({
                "rsrp_dbm": -85.0 - rng.random_range(0.0..15.0),
                "rsrq_db": -10.0 - rng.random_range(0.0..4.0),
                "sinr_db": 10.0 - rng.random_range(0.0..5.0),
                "band": "B3",
                "technology": "LTE",
                "roaming": false,
                "latency_ms": 60.0 + rng.random_range(0.0..40.0),
                "loss_pct": rng.random_range(0.0..1.5),
                "reachable": true,
            }));
        }
        Ok(Value::Null)
    }

    async fn exec(&self, cmd: &str, args: &[String], _timeout: Duration) -> CoreResult<ExecOutput> {
        if cmd == "iw" && args.iter().any(|a| a == "link") {
            let mut rng = rand::rng();
            let signal = -50 - rng.random_range(0..20);
            return Ok(ExecOutput {
                stdout: format!("Connected\n\tsignal: {signal} dBm\n\ttx bitrate: 120.0 MBit/s\n"),
                stderr: String::new(),
                exit: 0,
            });
        }
        if cmd == "iw" && args.iter().any(|a| a == "info") {
            return Ok(ExecOutput {
                stdout: "Interface wlan0\n\tchannel 36 (5180 MHz), width: 80 MHz\n".into(),
                stderr: String::new(),
                exit: 0,
            });
        }
        Ok(ExecOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit: 0,
        })
    }
}

pub struct MockStarlinkClient;

#[async_trait]
impl StarlinkClient for MockStarlinkClient {
    async fn get_status(&self, _iface: &str, _timeout: Duration) -> CoreResult<StarlinkStatus> {
        let mut rng = rand::rng();
        Ok(StarlinkStatus {
            pop_ping_latency_ms: 35.0 + rng.random_range(0.0..15.0),
            pop_ping_drop_rate: rng.random_range(0.0..0.02),
            snr: 9,
            fraction_obstructed: rng.random_range(0.0..0.02),
            time_obstructed: rng.random_range(0.0..0.01),
            obstruction_valid_s: 3600,
            avg_prolonged_obstruction_duration_s: 0.0,
            patches_valid: true,
            thermal_throttle: false,
            thermal_shutdown: false,
            swupdate_reboot_ready: false,
            swupdate_reboot_scheduled_utc: None,
        })
    }
}
