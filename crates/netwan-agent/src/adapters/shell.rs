//! Shell/ubus router adapter — the real host integration. Member discovery
//! goes through `ubus call mwan3 status`; weight and metered/roaming hints
//! live in UCI and are read/written with `uci`. Everything else funnels
//! through `exec`, matching the rest of the fleet's convention of shelling
//! out for host state rather than linking against OpenWrt's C libraries.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use netwan_types::error::{CoreError, CoreResult};
use serde_json::Value;
use tokio::process::Command;
use tracing::warn;

use netwan_core::adapters::{ExecOutput, PolicyMember, RouterAdapter, StarlinkClient, StarlinkStatus};

/// Spawns `cmd args...` with a hard timeout, matching [`RouterAdapter::exec`]'s
/// contract. Shared by every shell-backed adapter so the timeout/signal
/// handling lives in one place.
async fn run_command(cmd: &str, args: &[String], timeout: Duration) -> CoreResult<ExecOutput> {
    let mut command = Command::new(cmd);
    command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    let child = command.spawn().map_err(|e| CoreError::AdapterUnavailable(format!("failed to spawn {cmd}: {e}")))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(CoreError::TransientIo(format!("{cmd} failed: {e}"))),
        Err(_) => {
            warn!(cmd, "shell command timed out");
            Err(CoreError::TransientIo(format!("{cmd} timed out after {timeout:?}")))
        }
    }
}

pub struct ShellAdapter {
    default_timeout: Duration,
}

impl ShellAdapter {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    async fn run(&self, cmd: &str, args: &[&str]) -> CoreResult<ExecOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.exec(cmd, &args, self.default_timeout).await
    }
}

fn parse_mwan3_status(stdout: &str) -> CoreResult<Vec<PolicyMember>> {
    let value: Value = serde_json::from_str(stdout).map_err(|e| CoreError::ParseError {
        what: "mwan3 status".into(),
        detail: e.to_string(),
    })?;

    let interfaces = value
        .get("interfaces")
        .and_then(Value::as_object)
        .ok_or_else(|| CoreError::ParseError {
            what: "mwan3 status".into(),
            detail: "missing `interfaces` object".into(),
        })?;

    let mut members = Vec::with_capacity(interfaces.len());
    for (name, info) in interfaces {
        let up = info.get("up").and_then(Value::as_bool).unwrap_or(false);
        let device = info.get("device").and_then(Value::as_str).unwrap_or(name).to_string();
        members.push(PolicyMember {
            name: name.clone(),
            class_hint: None,
            iface: device,
            weight: if up { 100 } else { 0 },
            metered: false,
            prefer_roaming: false,
            min_uptime_s: 10,
            cooldown_s: 20,
        });
    }
    Ok(members)
}

#[async_trait]
impl RouterAdapter for ShellAdapter {
    async fn list_policy_members(&self) -> CoreResult<Vec<PolicyMember>> {
        let out = self.run("ubus", &["call", "mwan3", "status"]).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("ubus call mwan3 status exited {}", out.exit)));
        }
        parse_mwan3_status(&out.stdout)
    }

    async fn set_member_weight(&self, name: &str, weight: u32) -> CoreResult<()> {
        let assignment = format!("mwan3.{name}.weight={weight}");
        let out = self.run("uci", &["set", &assignment]).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("uci set failed: {}", out.stderr)));
        }
        self.config_commit("mwan3").await
    }

    async fn set_member_metric(&self, iface: &str, metric: u32) -> CoreResult<()> {
        let out = self.run("ip", &["route", "change", "default", "dev", iface, "metric", &metric.to_string()]).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("ip route change failed: {}", out.stderr)));
        }
        Ok(())
    }

    async fn reload_policy(&self) -> CoreResult<()> {
        let out = self.run("mwan3", &["restart"]).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("mwan3 restart failed: {}", out.stderr)));
        }
        Ok(())
    }

    async fn config_get(&self, key: &str) -> CoreResult<Option<String>> {
        let out = self.run("uci", &["get", key]).await?;
        if !out.succeeded() {
            return Ok(None);
        }
        Ok(Some(out.stdout.trim().to_string()))
    }

    async fn config_set(&self, key: &str, value: &str) -> CoreResult<()> {
        let assignment = format!("{key}={value}");
        let out = self.run("uci", &["set", &assignment]).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("uci set failed: {}", out.stderr)));
        }
        Ok(())
    }

    async fn config_commit(&self, section: &str) -> CoreResult<()> {
        let out = self.run("uci", &["commit", section]).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("uci commit failed: {}", out.stderr)));
        }
        Ok(())
    }

    async fn bus_call(&self, service: &str, method: &str, payload: Value) -> CoreResult<Value> {
        let payload_str = payload.to_string();
        let out = self.run("ubus", &["call", service, method, &payload_str]).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("ubus call {service} {method} exited {}", out.exit)));
        }
        if out.stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&out.stdout).map_err(|e| CoreError::ParseError {
            what: format!("{service}.{method} response"),
            detail: e.to_string(),
        })
    }

    async fn exec(&self, cmd: &str, args: &[String], timeout: Duration) -> CoreResult<ExecOutput> {
        run_command(cmd, args, timeout).await
    }
}

/// Fetches dish status via `grpcurl` against the dish's local gRPC service,
/// since the dish itself exposes no CLI and the fleet avoids linking a gRPC
/// client library for a single endpoint. Requires `grpcurl` on the host's
/// `PATH`.
pub struct ShellStarlinkClient {
    endpoint: String,
}

impl ShellStarlinkClient {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }
}

fn parse_dish_status(stdout: &str) -> CoreResult<StarlinkStatus> {
    let value: Value = serde_json::from_str(stdout).map_err(|e| CoreError::ParseError {
        what: "dish_get_status".into(),
        detail: e.to_string(),
    })?;
    let status = value.get("dishGetStatus").unwrap_or(&value);

    let get_f64 = |path: &str| status.get(path).and_then(Value::as_f64).unwrap_or(0.0);
    let obstruction = status.get("obstructionStats");

    Ok(StarlinkStatus {
        pop_ping_latency_ms: get_f64("popPingLatencyMs"),
        pop_ping_drop_rate: get_f64("popPingDropRate"),
        snr: status.get("snr").and_then(Value::as_i64).unwrap_or(0) as i32,
        fraction_obstructed: obstruction.and_then(|o| o.get("fractionObstructed")).and_then(Value::as_f64).unwrap_or(0.0),
        time_obstructed: obstruction.and_then(|o| o.get("timeObstructed")).and_then(Value::as_f64).unwrap_or(0.0),
        obstruction_valid_s: obstruction
            .and_then(|o| o.get("validS"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        avg_prolonged_obstruction_duration_s: obstruction
            .and_then(|o| o.get("avgProlongedObstructionDurationS"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        patches_valid: status.get("swupdateState").and_then(|s| s.get("softwareUpdateState")).is_some(),
        thermal_throttle: status.get("thermalThrottle").and_then(Value::as_bool).unwrap_or(false),
        thermal_shutdown: status.get("thermalShutdown").and_then(Value::as_bool).unwrap_or(false),
        swupdate_reboot_ready: status.get("swupdateRebootReady").and_then(Value::as_bool).unwrap_or(false),
        swupdate_reboot_scheduled_utc: None,
    })
}

#[async_trait]
impl StarlinkClient for ShellStarlinkClient {
    async fn get_status(&self, _iface: &str, timeout: Duration) -> CoreResult<StarlinkStatus> {
        let args = vec![
            "-plaintext".to_string(),
            "-d".to_string(),
            "{\"get_status\":{}}".to_string(),
            self.endpoint.clone(),
            "SpaceX.API.Device.Device/Handle".to_string(),
        ];
        let out = run_command("grpcurl", &args, timeout).await?;
        if !out.succeeded() {
            return Err(CoreError::AdapterUnavailable(format!("grpcurl exited {}: {}", out.exit, out.stderr)));
        }
        parse_dish_status(&out.stdout)
    }
}
