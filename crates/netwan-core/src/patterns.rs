//! Pattern Analyzer (C7) — consumes the decision log and produces
//! [`Pattern`]s. Each algorithm in §4.7 is a free function over a slice of
//! [`DecisionRecord`]s (oldest first) so it can be tested without a live
//! store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use netwan_types::ids::pattern_id;
use netwan_types::models::{DecisionRecord, DecisionType, Pattern, PatternMetrics, PatternType, Severity};

use crate::predictors::regression::fit;

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn make_pattern(
    pattern_type: PatternType,
    confidence: f64,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
    metrics: PatternMetrics,
    recommendations: Vec<String>,
) -> Pattern {
    Pattern {
        id: pattern_id(),
        pattern_type,
        confidence: confidence.clamp(0.0, 1.0),
        start_ts,
        end_ts,
        severity: Severity::from_confidence(confidence.clamp(0.0, 1.0)),
        metrics,
        recommendations,
    }
}

/// Groups decisions by type and looks for a tight inter-arrival interval —
/// a repeating flap rather than independent, unrelated switches.
pub fn detect_cyclic(records: &[DecisionRecord]) -> Vec<Pattern> {
    let mut by_type: HashMap<DecisionType, Vec<&DecisionRecord>> = HashMap::new();
    for record in records {
        by_type.entry(record.decision_type).or_default().push(record);
    }

    let mut patterns = Vec::new();
    for group in by_type.values() {
        if group.len() < 4 {
            continue;
        }
        let mut sorted = group.clone();
        sorted.sort_by_key(|r| r.ts);
        let intervals: Vec<f64> = sorted
            .windows(2)
            .map(|pair| (pair[1].ts - pair[0].ts).num_milliseconds() as f64 / 1000.0)
            .collect();
        let (mean, std) = mean_std(&intervals);
        if mean <= 0.0 {
            continue;
        }
        let cv = std / mean;
        if cv < 0.3 {
            patterns.push(make_pattern(
                PatternType::Cyclic,
                1.0 - cv,
                sorted.first().unwrap().ts,
                sorted.last().unwrap().ts,
                PatternMetrics::Cyclic {
                    avg_interval_s: mean,
                    n: sorted.len(),
                },
                vec!["investigate recurring trigger for this member pair".to_string()],
            ));
        }
    }
    patterns
}

const CONFIDENCE_MIN_SLOPE: f64 = 0.02;
const SUCCESS_RATE_MIN_SLOPE: f64 = 0.03;
const DURATION_MIN_SLOPE_MS: f64 = 20.0;
const SUCCESS_RATE_WINDOW: usize = 5;

fn rolling_success_rate(records: &[&DecisionRecord]) -> Vec<f64> {
    let successes: Vec<f64> = records.iter().map(|r| if r.success { 1.0 } else { 0.0 }).collect();
    (0..successes.len())
        .map(|i| {
            let start = i.saturating_sub(SUCCESS_RATE_WINDOW - 1);
            let window = &successes[start..=i];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Regression-based trend detection over confidence, windowed success
/// rate, and execution duration.
pub fn detect_trend(records: &[DecisionRecord]) -> Vec<Pattern> {
    if records.len() < 4 {
        return Vec::new();
    }
    let ordered: Vec<&DecisionRecord> = records.iter().collect();
    let confidence: Vec<f64> = ordered.iter().map(|r| r.confidence).collect();
    let duration: Vec<f64> = ordered.iter().map(|r| r.execution_duration_ms as f64).collect();
    let success_rate = rolling_success_rate(&ordered);

    let mut patterns = Vec::new();
    let start_ts = ordered.first().unwrap().ts;
    let end_ts = ordered.last().unwrap().ts;

    let series = [
        ("confidence", &confidence, CONFIDENCE_MIN_SLOPE, false),
        ("success_rate", &success_rate, SUCCESS_RATE_MIN_SLOPE, false),
        ("execution_duration", &duration, DURATION_MIN_SLOPE_MS, true),
    ];

    for (_name, values, min_slope, higher_is_worse) in series {
        let Some(reg) = fit(values) else { continue };
        if reg.r2 < 0.3 || reg.slope.abs() < min_slope {
            continue;
        }
        let deteriorating = if higher_is_worse { reg.slope > 0.0 } else { reg.slope < 0.0 };
        let pattern_type = if deteriorating { PatternType::Deteriorating } else { PatternType::Improving };
        let confidence = reg.r2;
        patterns.push(make_pattern(
            pattern_type,
            confidence,
            start_ts,
            end_ts,
            PatternMetrics::Trend {
                slope: reg.slope,
                r2: reg.r2,
                n: values.len(),
            },
            vec![],
        ));
    }
    patterns
}

/// Per-series z-score anomaly detection over confidence and execution time.
pub fn detect_anomaly(records: &[DecisionRecord]) -> Vec<Pattern> {
    if records.len() < 3 {
        return Vec::new();
    }
    let confidence: Vec<f64> = records.iter().map(|r| r.confidence).collect();
    let duration: Vec<f64> = records.iter().map(|r| r.execution_duration_ms as f64).collect();
    let (conf_mean, conf_std) = mean_std(&confidence);
    let (dur_mean, dur_std) = mean_std(&duration);

    let mut patterns = Vec::new();
    for record in records {
        let z_conf = if conf_std > 0.0 { (record.confidence - conf_mean) / conf_std } else { 0.0 };
        let z_exec = if dur_std > 0.0 {
            (record.execution_duration_ms as f64 - dur_mean) / dur_std
        } else {
            0.0
        };
        if z_conf.abs() > 2.0 || z_exec.abs() > 2.0 {
            let confidence = (z_conf.abs().max(z_exec.abs()) / 4.0).min(1.0);
            patterns.push(make_pattern(
                PatternType::Anomaly,
                confidence,
                record.ts,
                record.ts,
                PatternMetrics::Anomaly { z_conf, z_exec },
                vec![],
            ));
        }
    }
    patterns
}

/// Buckets decisions by the hour and flags any bucket with more than twice
/// the mean bucket count.
pub fn detect_spike(records: &[DecisionRecord]) -> Vec<Pattern> {
    if records.is_empty() {
        return Vec::new();
    }
    let mut buckets: HashMap<i64, Vec<&DecisionRecord>> = HashMap::new();
    for record in records {
        let bucket = record.ts.timestamp() / 3600;
        buckets.entry(bucket).or_default().push(record);
    }
    let mean_count = records.len() as f64 / buckets.len() as f64;
    if mean_count <= 0.0 {
        return Vec::new();
    }

    let mut patterns = Vec::new();
    for group in buckets.values() {
        let count = group.len();
        let ratio = count as f64 / mean_count;
        if ratio > 2.0 {
            let mut sorted = group.clone();
            sorted.sort_by_key(|r| r.ts);
            patterns.push(make_pattern(
                PatternType::Spike,
                (ratio / 4.0).min(1.0),
                sorted.first().unwrap().ts,
                sorted.last().unwrap().ts,
                PatternMetrics::Spike {
                    count: count as u32,
                    avg: mean_count,
                    ratio,
                },
                vec![],
            ));
        }
    }
    patterns
}

pub fn analyze(records: &[DecisionRecord]) -> Vec<Pattern> {
    let mut out = detect_cyclic(records);
    out.extend(detect_trend(records));
    out.extend(detect_anomaly(records));
    out.extend(detect_spike(records));
    out
}
