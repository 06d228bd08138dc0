//! Telemetry Store (C4) — per-member ring buffers of samples and scores,
//! plus one process-wide decision log. Readers snapshot through a
//! per-member RW lock without blocking the writer; the decision log uses a
//! single writer-preferring lock, matching the concurrency model's
//! decision to consolidate what the source scattered across ad-hoc mutexes.

use std::collections::{HashMap, VecDeque};
use std::mem::size_of;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use netwan_types::models::{DecisionRecord, DecisionType, MetricSample, Score};
use tracing::warn;

struct MemberRing {
    samples: VecDeque<MetricSample>,
    scores: VecDeque<Score>,
    capacity: usize,
}

impl MemberRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(64)),
            scores: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    fn push_sample(&mut self, sample: MetricSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn push_score(&mut self, score: Score) {
        if self.scores.len() >= self.capacity {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
    }

    fn trim_to(&mut self, target_len: usize) {
        while self.samples.len() > target_len {
            self.samples.pop_front();
        }
    }
}

/// Per-member ring buffers of [`MetricSample`]/[`Score`], keyed by member
/// name. Each member exclusively owns its ring; cross-member access never
/// happens outside this store.
pub struct TelemetryStore {
    rings: RwLock<HashMap<String, RwLock<MemberRing>>>,
    ring_capacity: usize,
    rss_ceiling_bytes: usize,
}

impl TelemetryStore {
    pub fn new(ring_capacity: usize, rss_ceiling_bytes: usize) -> Self {
        Self {
            rings: RwLock::new(HashMap::new()),
            ring_capacity,
            rss_ceiling_bytes,
        }
    }

    fn ensure_ring(&self, name: &str) {
        let needs_insert = !self.rings.read().expect("store lock poisoned").contains_key(name);
        if needs_insert {
            self.rings
                .write()
                .expect("store lock poisoned")
                .entry(name.to_string())
                .or_insert_with(|| RwLock::new(MemberRing::new(self.ring_capacity)));
        }
    }

    /// Rejects out-of-range or clock-skewed samples before insertion, per
    /// the store's ingestion invariant; returns whether it was accepted.
    pub fn append_sample(&self, name: &str, sample: MetricSample) -> bool {
        let now = Utc::now();
        if !sample.is_valid(now) {
            warn!(member = name, "rejecting invalid metric sample");
            return false;
        }
        self.ensure_ring(name);
        let rings = self.rings.read().expect("store lock poisoned");
        if let Some(ring) = rings.get(name) {
            ring.write().expect("ring lock poisoned").push_sample(sample);
        }
        true
    }

    pub fn append_score(&self, name: &str, score: Score) {
        self.ensure_ring(name);
        let rings = self.rings.read().expect("store lock poisoned");
        if let Some(ring) = rings.get(name) {
            ring.write().expect("ring lock poisoned").push_score(score);
        }
    }

    /// Samples for `name` at or after `since`, oldest first.
    pub fn samples_since(&self, name: &str, since: DateTime<Utc>) -> Vec<MetricSample> {
        let rings = self.rings.read().expect("store lock poisoned");
        rings
            .get(name)
            .map(|ring| {
                ring.read()
                    .expect("ring lock poisoned")
                    .samples
                    .iter()
                    .filter(|s| s.ts >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn latest_sample(&self, name: &str) -> Option<MetricSample> {
        let rings = self.rings.read().expect("store lock poisoned");
        rings
            .get(name)
            .and_then(|ring| ring.read().expect("ring lock poisoned").samples.back().cloned())
    }

    pub fn latest_score(&self, name: &str) -> Option<Score> {
        let rings = self.rings.read().expect("store lock poisoned");
        rings
            .get(name)
            .and_then(|ring| ring.read().expect("ring lock poisoned").scores.back().cloned())
    }

    pub fn all_samples(&self, name: &str) -> Vec<MetricSample> {
        let rings = self.rings.read().expect("store lock poisoned");
        rings
            .get(name)
            .map(|ring| ring.read().expect("ring lock poisoned").samples.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_scores(&self, name: &str) -> Vec<Score> {
        let rings = self.rings.read().expect("store lock poisoned");
        rings
            .get(name)
            .map(|ring| ring.read().expect("ring lock poisoned").scores.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops a member's ring entirely; called when the registry garbage
    /// collects a member that has been unseen too long.
    pub fn remove_member(&self, name: &str) {
        self.rings.write().expect("store lock poisoned").remove(name);
    }

    /// Approximates per-member ring memory use and trims the largest rings
    /// proportionally until the whole store is back under the configured
    /// RSS ceiling. Never surfaced to callers as an error — exceeding the
    /// cap is routine, not exceptional.
    pub fn enforce_memory_cap(&self) {
        let rings = self.rings.read().expect("store lock poisoned");
        let sample_size = size_of::<MetricSample>();
        let total: usize = rings
            .values()
            .map(|r| r.read().expect("ring lock poisoned").samples.len() * sample_size)
            .sum();
        if total <= self.rss_ceiling_bytes || total == 0 {
            return;
        }
        let shrink_ratio = self.rss_ceiling_bytes as f64 / total as f64;
        for ring in rings.values() {
            let mut ring = ring.write().expect("ring lock poisoned");
            let target = ((ring.samples.len() as f64) * shrink_ratio).floor() as usize;
            ring.trim_to(target);
        }
    }
}

/// Single process-wide, append-only decision log with FIFO eviction.
pub struct DecisionLog {
    records: RwLock<VecDeque<DecisionRecord>>,
    capacity: usize,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    pub fn append(&self, record: DecisionRecord) {
        let mut records = self.records.write().expect("log lock poisoned");
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn recent(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<DecisionRecord> {
        let records = self.records.read().expect("log lock poisoned");
        records
            .iter()
            .rev()
            .filter(|r| since.map_or(true, |since| r.ts >= since))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn by_type(&self, decision_type: DecisionType, limit: usize) -> Vec<DecisionRecord> {
        let records = self.records.read().expect("log lock poisoned");
        records
            .iter()
            .rev()
            .filter(|r| r.decision_type == decision_type)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn by_id(&self, id: &str) -> Option<DecisionRecord> {
        let records = self.records.read().expect("log lock poisoned");
        records.iter().find(|r| r.id == id).cloned()
    }

    pub fn all(&self) -> Vec<DecisionRecord> {
        self.records.read().expect("log lock poisoned").iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwan_types::models::ClassMetrics;

    fn sample(ts: DateTime<Utc>) -> MetricSample {
        MetricSample {
            ts,
            latency_ms: 20.0,
            loss_pct: 0.0,
            jitter_ms: 1.0,
            reachable: true,
            link_up: true,
            class_metrics: ClassMetrics::Generic,
        }
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let store = TelemetryStore::new(3, 16 * 1024 * 1024);
        let base = Utc::now();
        for i in 0..5 {
            store.append_sample("wan_a", sample(base + chrono::Duration::seconds(i)));
        }
        assert_eq!(store.all_samples("wan_a").len(), 3);
    }

    #[test]
    fn rejects_invalid_sample() {
        let store = TelemetryStore::new(10, 16 * 1024 * 1024);
        let mut bad = sample(Utc::now());
        bad.loss_pct = 150.0;
        assert!(!store.append_sample("wan_a", bad));
        assert!(store.all_samples("wan_a").is_empty());
    }

    #[test]
    fn decision_log_fifo_eviction() {
        let log = DecisionLog::new(2);
        for i in 0..3 {
            log.append(DecisionRecord {
                id: format!("dec_{i}"),
                ts: Utc::now(),
                decision_type: DecisionType::Noop,
                trigger: "test".into(),
                from_member: None,
                to_member: None,
                reasoning: String::new(),
                confidence: 1.0,
                metrics_snapshot: HashMap::new(),
                score_snapshot: HashMap::new(),
                execution_duration_ms: 0,
                success: true,
                error: None,
                root_cause_category: None,
                recommendations: vec![],
            });
        }
        assert_eq!(log.len(), 2);
        assert!(log.by_id("dec_0").is_none());
        assert!(log.by_id("dec_2").is_some());
    }

    #[test]
    fn memory_cap_trims_proportionally() {
        let store = TelemetryStore::new(1000, 0);
        let base = Utc::now();
        for i in 0..100 {
            store.append_sample("wan_a", sample(base + chrono::Duration::seconds(i)));
        }
        store.enforce_memory_cap();
        assert!(store.all_samples("wan_a").len() < 100);
    }
}
