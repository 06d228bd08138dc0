//! Decision Auditor (C9) — read-side queries over the decision log plus
//! root-cause synthesis. Evidence precedence (checked in order, first
//! match wins) per §4.9: Starlink obstruction, Starlink SNR, cellular
//! signal, network reliability (loss), network performance (latency),
//! system performance (execution time), recovery, verification, unknown.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use netwan_types::ids::root_cause_id;
use netwan_types::models::{ClassMetrics, DecisionRecord, DecisionType, RootCause, RootCauseCategory};

use crate::store::DecisionLog;

const OBSTRUCTION_EVIDENCE_PCT: f64 = 5.0;
const STARLINK_SNR_EVIDENCE_DB: i32 = 5;
const CELLULAR_RSRP_EVIDENCE_DBM: f64 = -100.0;
const CELLULAR_SINR_EVIDENCE_DB: f64 = 3.0;
const LOSS_EVIDENCE_PCT: f64 = 5.0;
const LATENCY_EVIDENCE_MS: f64 = 300.0;
const EXECUTION_EVIDENCE_MS: u64 = 2_000;

/// Aggregate counts over a window of the decision log, surfaced by the
/// `history`/`status` RPC methods.
#[derive(Debug, Clone, Default)]
pub struct DecisionStats {
    pub total: usize,
    pub by_type: HashMap<DecisionType, usize>,
    pub success_count: usize,
    pub avg_confidence: f64,
    pub avg_execution_duration_ms: f64,
}

/// Optional external sink a `DecisionAuditor` forwards every appended
/// decision to (e.g. a file or remote log shipper). Never required for
/// correctness — the in-memory [`DecisionLog`] is the durable source the
/// rest of the core reads from.
pub trait AuditSink: Send + Sync {
    fn record(&self, decision: &DecisionRecord);
}

pub struct DecisionAuditor {
    log: Arc<DecisionLog>,
    sink: Option<Arc<dyn AuditSink>>,
}

impl DecisionAuditor {
    pub fn new(log: Arc<DecisionLog>) -> Self {
        Self { log, sink: None }
    }

    pub fn with_sink(log: Arc<DecisionLog>, sink: Arc<dyn AuditSink>) -> Self {
        Self { log, sink: Some(sink) }
    }

    /// Appends a decision to the log and forwards it to the configured
    /// sink, if any. The scheduler calls this instead of going through
    /// `DecisionLog::append` directly so every decision reaches the sink
    /// exactly once.
    pub fn append(&self, decision: DecisionRecord) {
        if let Some(sink) = &self.sink {
            sink.record(&decision);
        }
        self.log.append(decision);
    }

    pub fn recent(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<DecisionRecord> {
        self.log.recent(since, limit)
    }

    pub fn by_type(&self, decision_type: DecisionType, limit: usize) -> Vec<DecisionRecord> {
        self.log.by_type(decision_type, limit)
    }

    pub fn by_id(&self, id: &str) -> Option<DecisionRecord> {
        self.log.by_id(id)
    }

    pub fn stats(&self, since: Option<DateTime<Utc>>) -> DecisionStats {
        let records = self.log.recent(since, usize::MAX);
        if records.is_empty() {
            return DecisionStats::default();
        }
        let mut by_type = HashMap::new();
        let mut success_count = 0;
        let mut confidence_sum = 0.0;
        let mut duration_sum = 0.0;
        for r in &records {
            *by_type.entry(r.decision_type).or_insert(0) += 1;
            if r.success {
                success_count += 1;
            }
            confidence_sum += r.confidence;
            duration_sum += r.execution_duration_ms as f64;
        }
        let n = records.len() as f64;
        DecisionStats {
            total: records.len(),
            by_type,
            success_count,
            avg_confidence: confidence_sum / n,
            avg_execution_duration_ms: duration_sum / n,
        }
    }

    /// Attaches a root-cause analysis to one decision, inspecting the
    /// `from_member`'s metrics snapshot in the evidence precedence order.
    pub fn analyze(&self, record: &DecisionRecord) -> RootCause {
        let (category, description, evidence) = classify(record);
        RootCause {
            id: root_cause_id(),
            decision_id: record.id.clone(),
            category,
            description,
            confidence: record.confidence,
            evidence,
            impact: impact_for(record),
            recommendations: record.recommendations.clone(),
        }
    }
}

fn classify(record: &DecisionRecord) -> (RootCauseCategory, String, Vec<String>) {
    match record.decision_type {
        DecisionType::Restore => {
            return (RootCauseCategory::Recovery, "member recovered and was restored to service".into(), vec![record.reasoning.clone()]);
        }
        DecisionType::Recheck => {
            return (RootCauseCategory::Verification, "decision pending re-confirmation".into(), vec![record.reasoning.clone()]);
        }
        DecisionType::Noop => {
            if record.from_member.is_none() {
                return (RootCauseCategory::Unknown, "no action taken".into(), vec![]);
            }
        }
        DecisionType::Failover => {}
    }

    let Some(from) = record.from_member.as_ref() else {
        return (RootCauseCategory::Unknown, "no originating member on this decision".into(), vec![]);
    };
    let Some(sample) = record.metrics_snapshot.get(from) else {
        return (RootCauseCategory::Unknown, "no telemetry snapshot for originating member".into(), vec![]);
    };

    match &sample.class_metrics {
        ClassMetrics::Starlink(m) if m.obstruction_pct >= OBSTRUCTION_EVIDENCE_PCT => (
            RootCauseCategory::StarlinkObstruction,
            format!("dish obstruction at {:.1}%", m.obstruction_pct),
            vec![format!("obstruction_pct={:.1}", m.obstruction_pct)],
        ),
        ClassMetrics::Starlink(m) if m.snr_db < STARLINK_SNR_EVIDENCE_DB => {
            (RootCauseCategory::StarlinkSignal, format!("low SNR at {} dB", m.snr_db), vec![format!("snr_db={}", m.snr_db)])
        }
        ClassMetrics::Cellular(m) if m.rsrp_dbm < CELLULAR_RSRP_EVIDENCE_DBM || m.sinr_db < CELLULAR_SINR_EVIDENCE_DB => (
            RootCauseCategory::CellularSignal,
            format!("weak cellular signal (RSRP {:.1} dBm, SINR {:.1} dB)", m.rsrp_dbm, m.sinr_db),
            vec![format!("rsrp_dbm={:.1}", m.rsrp_dbm), format!("sinr_db={:.1}", m.sinr_db)],
        ),
        _ if sample.loss_pct >= LOSS_EVIDENCE_PCT => (
            RootCauseCategory::NetworkReliability,
            format!("packet loss at {:.1}%", sample.loss_pct),
            vec![format!("loss_pct={:.1}", sample.loss_pct)],
        ),
        _ if sample.latency_ms >= LATENCY_EVIDENCE_MS => (
            RootCauseCategory::NetworkPerformance,
            format!("elevated latency at {:.0}ms", sample.latency_ms),
            vec![format!("latency_ms={:.0}", sample.latency_ms)],
        ),
        _ if record.execution_duration_ms >= EXECUTION_EVIDENCE_MS => (
            RootCauseCategory::SystemPerformance,
            format!("slow decision execution at {}ms", record.execution_duration_ms),
            vec![format!("execution_duration_ms={}", record.execution_duration_ms)],
        ),
        _ => (RootCauseCategory::Unknown, "no single dominant evidence factor".into(), vec![]),
    }
}

fn impact_for(record: &DecisionRecord) -> String {
    match record.decision_type {
        DecisionType::Failover => "service moved off the originating member".into(),
        DecisionType::Restore => "service returned to its preferred member".into(),
        DecisionType::Recheck => "no service impact yet; under evaluation".into(),
        DecisionType::Noop => "no service impact".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwan_types::models::{MetricSample, StarlinkMetrics};

    fn base_record(decision_type: DecisionType, from: Option<&str>) -> DecisionRecord {
        DecisionRecord {
            id: "dec_x".into(),
            ts: Utc::now(),
            decision_type,
            trigger: "test".into(),
            from_member: from.map(String::from),
            to_member: None,
            reasoning: "test reasoning".into(),
            confidence: 0.9,
            metrics_snapshot: HashMap::new(),
            score_snapshot: HashMap::new(),
            execution_duration_ms: 10,
            success: true,
            error: None,
            root_cause_category: None,
            recommendations: vec![],
        }
    }

    #[test]
    fn obstruction_takes_precedence_over_loss() {
        let mut record = base_record(DecisionType::Failover, Some("wan_sl"));
        record.metrics_snapshot.insert(
            "wan_sl".into(),
            MetricSample {
                ts: Utc::now(),
                latency_ms: 10.0,
                loss_pct: 20.0,
                jitter_ms: 1.0,
                reachable: true,
                link_up: true,
                class_metrics: ClassMetrics::Starlink(StarlinkMetrics {
                    obstruction_pct: 15.0,
                    snr_db: 9,
                    ..Default::default()
                }),
            },
        );
        let log = Arc::new(DecisionLog::new(10));
        let auditor = DecisionAuditor::new(log);
        let rc = auditor.analyze(&record);
        assert_eq!(rc.category, RootCauseCategory::StarlinkObstruction);
    }

    #[test]
    fn restore_is_classified_as_recovery() {
        let record = base_record(DecisionType::Restore, Some("wan_sl"));
        let log = Arc::new(DecisionLog::new(10));
        let auditor = DecisionAuditor::new(log);
        let rc = auditor.analyze(&record);
        assert_eq!(rc.category, RootCauseCategory::Recovery);
    }

    #[test]
    fn stats_aggregate_across_the_log() {
        let log = Arc::new(DecisionLog::new(10));
        for i in 0..3 {
            let mut r = base_record(DecisionType::Noop, None);
            r.id = format!("dec_{i}");
            r.success = i != 1;
            log.append(r);
        }
        let auditor = DecisionAuditor::new(log);
        let stats = auditor.stats(None);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success_count, 2);
    }

    #[test]
    fn append_forwards_to_the_configured_sink() {
        struct CountingSink(std::sync::atomic::AtomicUsize);
        impl AuditSink for CountingSink {
            fn record(&self, _decision: &DecisionRecord) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let log = Arc::new(DecisionLog::new(10));
        let sink = Arc::new(CountingSink(std::sync::atomic::AtomicUsize::new(0)));
        let auditor = DecisionAuditor::with_sink(log, sink.clone());

        auditor.append(base_record(DecisionType::Noop, None));
        auditor.append(base_record(DecisionType::Noop, None));

        assert_eq!(sink.0.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(auditor.stats(None).total, 2);
    }
}
