//! Request/response shapes for the daemon's local RPC surface (§6).
//!
//! Each method gets one result type and, where it takes arguments, one
//! request type; there is no shared envelope because the surface is a
//! fixed, closed set of six methods rather than an open message bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DaemonConfig;
use crate::models::{DecisionRecord, MemberClass, MetricSample, Score, SystemState};

/// Result of the `status` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub state: SystemState,
    pub current: Option<String>,
    pub rank: Vec<RankedMember>,
    pub last_event: Option<DecisionRecord>,
    pub config: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMember {
    pub name: String,
    pub class: MemberClass,
    #[serde(rename = "final")]
    pub final_score: f64,
    pub eligible: bool,
}

/// One entry of the `members` method's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberView {
    pub name: String,
    pub class: MemberClass,
    pub iface: String,
    pub eligible: bool,
    pub score: MemberScoreView,
    pub metrics: Option<MetricSample>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemberScoreView {
    pub instant: f64,
    pub ewma: f64,
    #[serde(rename = "final")]
    pub final_score: f64,
}

/// Arguments to the `metrics` method.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResult {
    pub name: String,
    pub samples: Vec<MetricSample>,
}

/// Arguments to the `history` method.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRequest {
    pub name: String,
    #[serde(default)]
    pub since_s: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub score: Score,
    pub sample: MetricSample,
}

/// Arguments to the `events` method.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsRequest {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// The three hints the `action` method accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCommand {
    Failover,
    Restore,
    Recheck,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub cmd: ActionCommand,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub accepted: bool,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_command_parses_snake_case() {
        let req: ActionRequest = serde_json::from_str(r#"{"cmd":"failover","name":"wan_a"}"#)
            .unwrap();
        assert_eq!(req.cmd, ActionCommand::Failover);
        assert_eq!(req.name.as_deref(), Some("wan_a"));
    }

    #[test]
    fn action_result_rejected_carries_error() {
        let result = ActionResult::rejected("adapter_unavailable");
        assert!(!result.accepted);
        assert_eq!(result.error.as_deref(), Some("adapter_unavailable"));
    }
}
