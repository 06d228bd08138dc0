//! Scoring Engine (C5) — composite instant/EWMA/window score per §4.5, plus
//! eligibility gating. Pure functions over the types in `netwan_types` so
//! the formula is unit-testable without touching the store or a clock.

use chrono::{DateTime, Utc};
use netwan_types::config::{DataCapMode, ScoreWeights};
use netwan_types::models::{ClassMetrics, Member, MetricSample, Score};

fn norm(x: f64, ok: f64, bad: f64) -> f64 {
    (((x - ok) / (bad - ok)).clamp(0.0, 1.0)) * 100.0
}

/// Instant 0-100 health score for one sample, per §4.5's formula.
pub fn instant_score(member: &Member, sample: &MetricSample, weights: &ScoreWeights, data_cap_mode: DataCapMode) -> f64 {
    let mut score = 100.0;
    score -= weights.latency * norm(sample.latency_ms, weights.latency_ok_ms, weights.latency_bad_ms);
    score -= weights.loss * norm(sample.loss_pct, weights.loss_ok_pct, weights.loss_bad_pct);
    score -= weights.jitter * norm(sample.jitter_ms, weights.jitter_ok_ms, weights.jitter_bad_ms);

    match &sample.class_metrics {
        ClassMetrics::Starlink(m) => {
            score -= weights.obstruction * norm(m.obstruction_pct, weights.obstruction_ok_pct, weights.obstruction_bad_pct);
            if m.thermal_throttle {
                score -= 10.0;
            }
            if m.thermal_shutdown {
                score -= 60.0;
            }
            if m.swupdate_reboot_ready {
                score -= 40.0;
            }
            if m.obstruction_pct < 0.5 && m.snr_db >= 9 {
                score += 5.0;
            }
        }
        ClassMetrics::Cellular(m) => {
            if m.roaming && !member.hints.prefer_roaming {
                score -= 15.0;
            }
            if m.rsrp_dbm < -110.0 {
                score -= 20.0;
            }
            if member.hints.metered {
                score -= match data_cap_mode {
                    DataCapMode::Strict => 25.0,
                    DataCapMode::Balanced => 12.0,
                    DataCapMode::Off => 0.0,
                };
            }
            if m.rsrp_dbm > -80.0 && m.sinr_db > 15.0 {
                score += 5.0;
            }
        }
        ClassMetrics::Wifi(m) => {
            if m.signal_strength_dbm < -80.0 {
                score -= 15.0;
            }
            if m.quality_pct < 30.0 {
                score -= 20.0;
            }
        }
        ClassMetrics::Generic => {}
    }

    if !sample.reachable || !sample.link_up {
        score = score.min(20.0);
    }

    score.clamp(0.0, 100.0)
}

pub fn ewma(prev_ewma: f64, instant: f64, alpha: f64) -> f64 {
    alpha * instant + (1.0 - alpha) * prev_ewma
}

pub fn window_avg(recent_instants: &[f64]) -> f64 {
    if recent_instants.is_empty() {
        return 0.0;
    }
    recent_instants.iter().sum::<f64>() / recent_instants.len() as f64
}

pub fn final_score(instant: f64, ewma: f64, window_avg: f64) -> f64 {
    (0.30 * instant + 0.50 * ewma + 0.20 * window_avg).clamp(0.0, 100.0)
}

/// Whether `member` may be chosen as a switch target this tick, per the
/// eligibility gate in §4.5.
pub fn is_eligible(
    member: &Member,
    sample: &MetricSample,
    final_score: f64,
    tick_interval_ms: u64,
    min_final: f64,
    now: DateTime<Utc>,
) -> bool {
    if !sample.link_up {
        return false;
    }
    if member.weight == 0 {
        return false;
    }
    if member.in_cooldown(now) {
        return false;
    }
    if final_score < min_final {
        return false;
    }
    let required_ticks = if tick_interval_ms == 0 {
        1
    } else {
        member.hints.min_uptime_s as u64 * 1000 / tick_interval_ms.max(1)
    };
    member.consecutive_up_ticks as u64 >= required_ticks
}

/// Computes a full [`Score`] for one member's tick given its prior score
/// (if any) and the instant values of the last `window` ticks (oldest
/// first, not yet including the current sample).
#[allow(clippy::too_many_arguments)]
pub fn compute(
    member: &Member,
    sample: &MetricSample,
    prev_score: Option<&Score>,
    recent_instants: &[f64],
    weights: &ScoreWeights,
    data_cap_mode: DataCapMode,
    alpha: f64,
    tick_interval_ms: u64,
    min_final: f64,
    now: DateTime<Utc>,
) -> Score {
    let instant = instant_score(member, sample, weights, data_cap_mode);
    let prev_ewma = prev_score.map(|s| s.ewma).unwrap_or(instant);
    let ewma_value = ewma(prev_ewma, instant, alpha);

    let mut window: Vec<f64> = recent_instants.to_vec();
    window.push(instant);
    let window_value = window_avg(&window);

    let final_value = final_score(instant, ewma_value, window_value);
    let eligible = is_eligible(member, sample, final_value, tick_interval_ms, min_final, now);

    let eligible_at = if eligible {
        match prev_score.and_then(|s| s.eligible_at) {
            Some(since) => Some(since),
            None => Some(now),
        }
    } else {
        None
    };

    Score {
        instant,
        ewma: ewma_value,
        window_avg: window_value,
        final_score: final_value,
        eligible_at,
    }
}
