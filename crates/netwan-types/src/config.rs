use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top level daemon configuration, loaded from a TOML file at startup.
///
/// Every field has a default so a missing config file (or a config file
/// missing a section) still produces a usable daemon; `DaemonConfig::validate`
/// is the single place that rejects nonsensical combinations instead of
/// letting them surface later as a confusing runtime error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub scheduler: SchedulerConfig,
    pub scoring: ScoringConfig,
    pub controller: ControllerConfig,
    pub collectors: CollectorConfig,
    pub store: StoreConfig,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub location_predictors: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            scoring: ScoringConfig::default(),
            controller: ControllerConfig::default(),
            collectors: CollectorConfig::default(),
            store: StoreConfig::default(),
            rpc: RpcConfig::default(),
            location_predictors: false,
        }
    }
}

impl DaemonConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        toml::from_str(raw).map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.tick_interval_ms must be non-zero".into(),
            ));
        }
        if self.controller.degraded_threshold >= self.controller.recovery_threshold {
            return Err(CoreError::InvalidConfig(
                "controller.degraded_threshold must be lower than controller.recovery_threshold"
                    .into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scoring.ewma_alpha) {
            return Err(CoreError::InvalidConfig(
                "scoring.ewma_alpha must be within [0, 1]".into(),
            ));
        }
        let w = &self.scoring.weights;
        for (name, value) in [
            ("latency", w.latency),
            ("loss", w.loss),
            ("jitter", w.jitter),
            ("obstruction", w.obstruction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::InvalidConfig(format!(
                    "scoring.weights.{name} must be within [0, 1] (got {value})"
                )));
            }
        }
        if self.store.ring_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "store.ring_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    pub member_stale_after_ticks: u32,
    pub housekeeping_every_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_500,
            member_stale_after_ticks: 5,
            housekeeping_every_ticks: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub ewma_alpha: f64,
    pub window_samples: usize,
    pub weights: ScoreWeights,
    pub data_cap_mode: DataCapMode,
    pub min_final_for_eligibility: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ewma_alpha: 0.3,
            window_samples: 30,
            weights: ScoreWeights::default(),
            data_cap_mode: DataCapMode::Balanced,
            min_final_for_eligibility: 40.0,
        }
    }
}

/// Weights for the instant-score deductions of §4.5's formula. `obstruction`
/// only applies to Starlink members; the rest apply to every class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub latency: f64,
    pub loss: f64,
    pub jitter: f64,
    pub obstruction: f64,
    pub latency_ok_ms: f64,
    pub latency_bad_ms: f64,
    pub loss_ok_pct: f64,
    pub loss_bad_pct: f64,
    pub jitter_ok_ms: f64,
    pub jitter_bad_ms: f64,
    pub obstruction_ok_pct: f64,
    pub obstruction_bad_pct: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            latency: 0.25,
            loss: 0.35,
            jitter: 0.15,
            obstruction: 0.25,
            latency_ok_ms: 50.0,
            latency_bad_ms: 400.0,
            loss_ok_pct: 0.0,
            loss_bad_pct: 10.0,
            jitter_ok_ms: 10.0,
            jitter_bad_ms: 100.0,
            obstruction_ok_pct: 0.0,
            obstruction_bad_pct: 20.0,
        }
    }
}

/// Penalty weighting applied to metered members' over-usage deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCapMode {
    Strict,
    Balanced,
    Off,
}

impl Default for DataCapMode {
    fn default() -> Self {
        DataCapMode::Balanced
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub degraded_threshold: f64,
    pub recovery_threshold: f64,
    pub switch_margin: f64,
    /// Wall-clock seconds the fail-window margin must hold before a
    /// failover commits (the EVALUATING dwell, not a tick count).
    pub fail_min_duration_s: u64,
    /// Wall-clock seconds a recovered higher-weight member must hold
    /// clean before the restore path commits. Longer than
    /// `fail_min_duration_s` by default, mirroring the spec's symmetric
    /// but longer restore window.
    pub restore_min_duration_s: u64,
    /// Raw loss-percent breach that alone is enough to open a failover
    /// evaluation window even when the composite score hasn't crossed
    /// `degraded_threshold` yet.
    pub fail_threshold_loss: f64,
    /// Raw latency-ms breach, same role as `fail_threshold_loss`.
    pub fail_threshold_latency: f64,
    /// Raw loss-percent ceiling a restore candidate must stay under for
    /// the whole restore window, or the evaluation aborts.
    pub restore_threshold_loss: f64,
    /// Raw latency-ms ceiling, same role as `restore_threshold_loss`.
    pub restore_threshold_latency: f64,
    /// Gates the predictor-triggered bypass in `evaluate`; when false,
    /// switches only ever follow the margin/duration hysteresis path.
    pub predictive: bool,
    pub min_dwell_ms: u64,
    pub commit_retry_backoff_ms: u64,
    pub commit_retry_backoff_max_ms: u64,
    pub commit_max_attempts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: 40.0,
            recovery_threshold: 55.0,
            switch_margin: 8.0,
            fail_min_duration_s: 5,
            restore_min_duration_s: 30,
            fail_threshold_loss: 5.0,
            fail_threshold_latency: 300.0,
            restore_threshold_loss: 1.0,
            restore_threshold_latency: 150.0,
            predictive: true,
            min_dwell_ms: 10_000,
            commit_retry_backoff_ms: 1_000,
            commit_retry_backoff_max_ms: 60_000,
            commit_max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub probe_timeout_ms: u64,
    pub starlink_grpc_endpoint: String,
    pub wifi_watermark_dbm: f64,
    pub generic_probe_targets: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2_000,
            starlink_grpc_endpoint: "192.168.100.1:9200".to_string(),
            wifi_watermark_dbm: -80.0,
            generic_probe_targets: vec!["1.1.1.1:443".to_string(), "8.8.8.8:443".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub ring_capacity: usize,
    pub decision_log_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 120,
            decision_log_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub bind_addr: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8732".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(DaemonConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_hysteresis_thresholds() {
        let mut cfg = DaemonConfig::default();
        cfg.controller.degraded_threshold = 60.0;
        cfg.controller.recovery_threshold = 50.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let mut cfg = DaemonConfig::default();
        cfg.scoring.weights.latency = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let raw = r#"
            [scheduler]
            tick_interval_ms = 2000
        "#;
        let cfg = DaemonConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.scheduler.tick_interval_ms, 2000);
        assert_eq!(cfg.scheduler.member_stale_after_ticks, 5);
    }
}
