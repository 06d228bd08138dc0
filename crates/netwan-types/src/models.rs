//! Data models shared across the decision pipeline and its RPC surface.
//!
//! These types represent members, telemetry, scores, decisions, and derived
//! patterns. The core owns them; adapters only ever see the narrow subset
//! each operation's contract names.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Member ──────────────────────────────────────────────────────────

/// Family of a member; selects its collector and scoring profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberClass {
    Starlink,
    Cellular,
    Wifi,
    Lan,
    Generic,
}

impl fmt::Display for MemberClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberClass::Starlink => "starlink",
            MemberClass::Cellular => "cellular",
            MemberClass::Wifi => "wifi",
            MemberClass::Lan => "lan",
            MemberClass::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

/// Admin-configurable policy hints carried alongside a member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyHints {
    pub prefer_roaming: bool,
    pub metered: bool,
    pub min_uptime_s: u32,
    pub cooldown_s: u32,
}

impl Default for PolicyHints {
    fn default() -> Self {
        Self {
            prefer_roaming: false,
            metered: false,
            min_uptime_s: 10,
            cooldown_s: 20,
        }
    }
}

/// A logical uplink with stable identity, as discovered from the host's
/// multi-WAN policy. Created on discovery, mutated only by the registry,
/// destroyed after it goes unseen for a configured number of refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub class: MemberClass,
    pub iface: String,
    pub weight: u32,
    pub eligible: bool,
    pub created_at: DateTime<Utc>,
    pub hints: PolicyHints,

    /// Bookkeeping mutated only by the registry and controller; not part of
    /// the host-facing policy contract but needed to evaluate eligibility
    /// and garbage collection without re-deriving it from scratch each tick.
    #[serde(default)]
    pub missed_refreshes: u32,
    #[serde(default)]
    pub consecutive_up_ticks: u32,
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

// ── MetricSample ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StarlinkMetrics {
    pub obstruction_pct: f64,
    pub obstruction_time_pct: f64,
    pub obstruction_valid_s: u32,
    pub obstruction_patches_valid: bool,
    pub snr_db: i32,
    pub thermal_throttle: bool,
    pub thermal_shutdown: bool,
    pub swupdate_reboot_ready: bool,
    #[serde(default)]
    pub reboot_scheduled_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CellularMetrics {
    pub rsrp_dbm: f64,
    pub rsrq_db: f64,
    pub sinr_db: f64,
    pub band: String,
    pub technology: String,
    pub roaming: bool,
    pub timing_advance: Option<i32>,
    pub signal_strength_dbm: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiMetrics {
    pub signal_strength_dbm: f64,
    pub noise_level_dbm: f64,
    pub quality_pct: f64,
    pub channel: u32,
    pub frequency_mhz: u32,
    pub throughput_kbps: Option<f64>,
}

/// Class-specific portion of a [`MetricSample`]. A tagged enum keeps each
/// sample self-describing instead of carrying an untyped metrics bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ClassMetrics {
    Starlink(StarlinkMetrics),
    Cellular(CellularMetrics),
    Wifi(WifiMetrics),
    Generic,
}

/// Per-member, per-tick snapshot produced by a collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub ts: DateTime<Utc>,
    pub latency_ms: f64,
    pub loss_pct: f64,
    pub jitter_ms: f64,
    pub reachable: bool,
    pub link_up: bool,
    pub class_metrics: ClassMetrics,
}

impl MetricSample {
    /// A degraded stand-in for a tick where the collector failed; never
    /// itself an error, matching the "absorb into next sample" propagation
    /// policy for collector failures.
    pub fn degraded(ts: DateTime<Utc>, class_metrics: ClassMetrics) -> Self {
        Self {
            ts,
            latency_ms: 0.0,
            loss_pct: 100.0,
            jitter_ms: 0.0,
            reachable: false,
            link_up: false,
            class_metrics,
        }
    }

    /// Rejects samples with out-of-range percentages or clock skew, per the
    /// store's ingestion invariants.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if !(0.0..=100.0).contains(&self.loss_pct) {
            return false;
        }
        if self.latency_ms < 0.0 || self.jitter_ms < 0.0 {
            return false;
        }
        let skew = (now - self.ts).num_seconds().abs();
        skew <= 15 * 60
    }
}

// ── Score ───────────────────────────────────────────────────────────

/// Composite 0-100 health score for a member, recomputed each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Score {
    pub instant: f64,
    pub ewma: f64,
    pub window_avg: f64,
    #[serde(rename = "final")]
    pub final_score: f64,
    /// When the member last transitioned into eligibility; `None` if it is
    /// not eligible as of this tick.
    pub eligible_at: Option<DateTime<Utc>>,
}

impl Score {
    pub fn is_eligible(&self) -> bool {
        self.eligible_at.is_some()
    }
}

// ── DecisionRecord ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Failover,
    Restore,
    Recheck,
    Noop,
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionType::Failover => "failover",
            DecisionType::Restore => "restore",
            DecisionType::Recheck => "recheck",
            DecisionType::Noop => "noop",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseCategory {
    NetworkPerformance,
    NetworkReliability,
    StarlinkObstruction,
    StarlinkSignal,
    CellularSignal,
    SystemPerformance,
    Recovery,
    Verification,
    Unknown,
}

/// Append-only audit entry for every considered switch, including no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub decision_type: DecisionType,
    pub trigger: String,
    pub from_member: Option<String>,
    pub to_member: Option<String>,
    pub reasoning: String,
    pub confidence: f64,
    pub metrics_snapshot: HashMap<String, MetricSample>,
    pub score_snapshot: HashMap<String, Score>,
    pub execution_duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub root_cause_category: Option<RootCauseCategory>,
    pub recommendations: Vec<String>,
}

// ── Pattern ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Cyclic,
    Deteriorating,
    Improving,
    Spike,
    Trend,
    Anomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Severity::Critical
        } else if confidence >= 0.6 {
            Severity::High
        } else if confidence >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Self-describing metrics carried by a [`Pattern`], replacing an untyped
/// metrics bag with one tagged variant per pattern algorithm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternMetrics {
    Cyclic { avg_interval_s: f64, n: usize },
    Trend { slope: f64, r2: f64, n: usize },
    Anomaly { z_conf: f64, z_exec: f64 },
    Spike { count: u32, avg: f64, ratio: f64 },
}

/// A derived, never-ingested meta-observation over the decision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub severity: Severity,
    pub metrics: PatternMetrics,
    pub recommendations: Vec<String>,
}

// ── RootCause ───────────────────────────────────────────────────────

/// Root-cause analysis attached to a [`DecisionRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCause {
    pub id: String,
    pub decision_id: String,
    pub category: RootCauseCategory,
    pub description: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub impact: String,
    pub recommendations: Vec<String>,
}

// ── SystemState ─────────────────────────────────────────────────────

/// Overall daemon state as surfaced by the `status` RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Primary,
    Backup,
    Degraded,
    Observing,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemState::Primary => "primary",
            SystemState::Backup => "backup",
            SystemState::Degraded => "degraded",
            SystemState::Observing => "observing",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rejects_out_of_range_loss() {
        let now = Utc::now();
        let mut sample = MetricSample::degraded(now, ClassMetrics::Generic);
        sample.loss_pct = 150.0;
        assert!(!sample.is_valid(now));
    }

    #[test]
    fn sample_rejects_clock_skew() {
        let now = Utc::now();
        let mut sample = MetricSample::degraded(now, ClassMetrics::Generic);
        sample.loss_pct = 0.0;
        sample.ts = now - chrono::Duration::minutes(30);
        assert!(!sample.is_valid(now));
    }

    #[test]
    fn severity_thresholds() {
        assert_eq!(Severity::from_confidence(0.95), Severity::Critical);
        assert_eq!(Severity::from_confidence(0.7), Severity::High);
        assert_eq!(Severity::from_confidence(0.5), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.1), Severity::Low);
    }

    #[test]
    fn member_cooldown_expires() {
        let now = Utc::now();
        let mut member = Member {
            name: "wan_a".into(),
            class: MemberClass::Generic,
            iface: "eth1".into(),
            weight: 100,
            eligible: true,
            created_at: now,
            hints: PolicyHints::default(),
            missed_refreshes: 0,
            consecutive_up_ticks: 0,
            cooldown_until: Some(now + chrono::Duration::seconds(10)),
            last_failure_at: None,
        };
        assert!(member.in_cooldown(now));
        member.cooldown_until = Some(now - chrono::Duration::seconds(1));
        assert!(!member.in_cooldown(now));
    }
}
