//! Switch Controller (C8) — the hysteresis state machine that turns scores
//! into decisions. Three states: steady (no action), evaluating (a
//! candidate has been degraded-triggered and is accumulating confirmations),
//! and the commit itself, which retries with backoff and is never entered
//! as a persisted state — it either succeeds and returns to steady or
//! exhausts its attempts and returns to steady with a failed decision.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use netwan_types::config::ControllerConfig;
use netwan_types::error::{CoreError, CoreResult};
use netwan_types::ids::decision_id;
use netwan_types::models::{DecisionRecord, DecisionType, Member, MetricSample, Score};
use tokio::time::sleep;
use tracing::warn;

use crate::adapters::RouterAdapter;
use crate::predictors::PredictorSignal;
use crate::registry::MemberRegistry;

#[derive(Debug, Clone, PartialEq)]
enum SwitchState {
    Steady,
    Evaluating { candidate: String, entered_at: DateTime<Utc> },
}

/// Owns the currently-active member and the hysteresis state driving
/// transitions away from it. One instance per daemon.
pub struct SwitchController {
    adapter: std::sync::Arc<dyn RouterAdapter>,
    registry: std::sync::Arc<MemberRegistry>,
    config: ControllerConfig,
    state: RwLock<SwitchState>,
    current_primary: RwLock<Option<String>>,
    last_switch_at: RwLock<Option<DateTime<Utc>>>,
}

impl SwitchController {
    pub fn new(adapter: std::sync::Arc<dyn RouterAdapter>, registry: std::sync::Arc<MemberRegistry>, config: ControllerConfig) -> Self {
        Self {
            adapter,
            registry,
            config,
            state: RwLock::new(SwitchState::Steady),
            current_primary: RwLock::new(None),
            last_switch_at: RwLock::new(None),
        }
    }

    pub fn current_primary(&self) -> Option<String> {
        self.current_primary.read().expect("controller lock poisoned").clone()
    }

    /// Whether the controller is mid-evaluation of a failover candidate
    /// (used by the `status` RPC to surface [`netwan_types::models::SystemState::Degraded`]).
    pub fn is_evaluating(&self) -> bool {
        matches!(*self.state.read().expect("controller lock poisoned"), SwitchState::Evaluating { .. })
    }

    fn in_dwell(&self, now: DateTime<Utc>) -> bool {
        self.last_switch_at
            .read()
            .expect("controller lock poisoned")
            .is_some_and(|t| (now - t).num_milliseconds() as u64 < self.config.min_dwell_ms)
    }

    /// Whether switching from `current` to `candidate` is a failback to a
    /// higher-preference member rather than an escape from a degraded one,
    /// per the restore path in §4.8 — driven by configured weight, not by
    /// the transient score that triggered the re-evaluation.
    fn is_restore(members: &[Member], current: &str, candidate: &str) -> bool {
        let weight_of = |name: &str| members.iter().find(|m| m.name == name).map(|m| m.weight).unwrap_or(0);
        weight_of(candidate) > weight_of(current)
    }

    fn best_eligible(&self, members: &[Member], scores: &HashMap<String, Score>, exclude: Option<&str>) -> Option<(String, f64)> {
        members
            .iter()
            .filter(|m| m.eligible && Some(m.name.as_str()) != exclude)
            .filter_map(|m| scores.get(&m.name).filter(|s| s.is_eligible()).map(|s| (m.name.clone(), s.final_score)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// One evaluation per tick. Takes a full snapshot of the tick's samples,
    /// scores, and predictor signals and returns the decision reached —
    /// always exactly one record, even when nothing changes (`Noop`).
    pub async fn evaluate(
        &self,
        members: &[Member],
        samples: &HashMap<String, MetricSample>,
        scores: &HashMap<String, Score>,
        predictor_signals: &HashMap<String, Vec<PredictorSignal>>,
        now: DateTime<Utc>,
    ) -> DecisionRecord {
        let current = match self.current_primary() {
            Some(c) => c,
            None => {
                return match self.best_eligible(members, scores, None) {
                    Some((name, _)) => {
                        *self.current_primary.write().expect("controller lock poisoned") = Some(name.clone());
                        self.record(DecisionType::Noop, "bootstrap", "initial primary selection", None, Some(name), samples, scores, 0, true, None, now)
                    }
                    None => self.record(DecisionType::Noop, "no_eligible", "no eligible members available", None, None, samples, scores, 0, true, None, now),
                };
            }
        };

        let current_score = scores.get(&current).map(|s| s.final_score).unwrap_or(0.0);
        let in_dwell = self.in_dwell(now);

        if self.config.predictive && !in_dwell {
            if let Some(signal) = predictor_signals.get(&current).and_then(|sigs| sigs.iter().find(|s| s.failover_eligible)) {
                // No margin requirement on the predictive path, but the target must
                // still be eligible and within 5 points of current, per §4.8(b).
                if let Some((candidate, cand_score)) = self.best_eligible(members, scores, Some(&current)) {
                    if cand_score >= current_score - 5.0 {
                        return self
                            .commit_switch(&current, &candidate, DecisionType::Failover, "predictive", &format!("failover: predictive signal: {}", signal.reason), samples, scores, now)
                            .await;
                    }
                }
            }
        }

        let state = self.state.read().expect("controller lock poisoned").clone();
        match state {
            SwitchState::Steady => {
                if !in_dwell {
                    if let Some((candidate, cand_score)) = self.best_eligible(members, scores, Some(&current)) {
                        let margin_met = cand_score - current_score >= self.config.switch_margin;
                        // A higher-weight member recovering re-enters evaluation on margin
                        // alone (the restore path); a same-or-lower-weight candidate needs
                        // either a degraded score or a raw loss/latency breach on current,
                        // so healthy members never get bumped by a merely-slightly-better peer.
                        let restore_candidate = Self::is_restore(members, &current, &candidate);
                        let raw_breach = samples
                            .get(&current)
                            .is_some_and(|s| s.loss_pct >= self.config.fail_threshold_loss || s.latency_ms >= self.config.fail_threshold_latency);
                        let enter = if restore_candidate {
                            margin_met
                        } else {
                            margin_met && (current_score < self.config.degraded_threshold || raw_breach)
                        };
                        if enter {
                            *self.state.write().expect("controller lock poisoned") = SwitchState::Evaluating { candidate: candidate.clone(), entered_at: now };
                            return self.record(
                                DecisionType::Recheck,
                                "evaluating",
                                &format!("evaluating {} to {candidate}", if restore_candidate { "restore" } else { "failover" }),
                                Some(current),
                                Some(candidate),
                                samples,
                                scores,
                                0,
                                true,
                                None,
                                now,
                            );
                        }
                    }
                }
                self.record(DecisionType::Noop, "steady", "steady", Some(current), None, samples, scores, 0, true, None, now)
            }
            SwitchState::Evaluating { candidate, entered_at } => {
                let is_restore_eval = Self::is_restore(members, &current, &candidate);
                // Only a failover-direction evaluation aborts when `current` recovers —
                // it was the reason the evaluation started. A restore-direction
                // evaluation is about the candidate's recovery, not current's health.
                if !is_restore_eval && current_score >= self.config.recovery_threshold {
                    *self.state.write().expect("controller lock poisoned") = SwitchState::Steady;
                    return self.record(
                        DecisionType::Recheck,
                        "recovered",
                        "current member recovered above recovery threshold, abandoning evaluation",
                        Some(current),
                        None,
                        samples,
                        scores,
                        0,
                        true,
                        None,
                        now,
                    );
                }
                let candidate_score = scores.get(&candidate).map(|s| s.final_score).unwrap_or(0.0);
                let candidate_eligible = scores.get(&candidate).map(|s| s.is_eligible()).unwrap_or(false);
                let candidate_within_restore_window = !is_restore_eval
                    || samples
                        .get(&candidate)
                        .is_some_and(|s| s.loss_pct <= self.config.restore_threshold_loss && s.latency_ms <= self.config.restore_threshold_latency);
                if !candidate_eligible || candidate_score - current_score < self.config.switch_margin || !candidate_within_restore_window {
                    *self.state.write().expect("controller lock poisoned") = SwitchState::Steady;
                    return self.record(
                        DecisionType::Recheck,
                        "disqualified",
                        "candidate no longer qualifies, returning to steady",
                        Some(current),
                        Some(candidate),
                        samples,
                        scores,
                        0,
                        true,
                        None,
                        now,
                    );
                }
                let elapsed_s = (now - entered_at).num_milliseconds().max(0) as u64 / 1000;
                let required_s = if is_restore_eval { self.config.restore_min_duration_s } else { self.config.fail_min_duration_s };
                if elapsed_s >= required_s {
                    let (decision_type, trigger, reasoning) = if is_restore_eval {
                        (DecisionType::Restore, "restore", "restore: preferred member recovered and held within window".to_string())
                    } else {
                        (DecisionType::Failover, "failover", "failover: sustained degradation confirmed".to_string())
                    };
                    return self.commit_switch(&current, &candidate, decision_type, trigger, &reasoning, samples, scores, now).await;
                }
                *self.state.write().expect("controller lock poisoned") = SwitchState::Evaluating { candidate: candidate.clone(), entered_at };
                self.record(
                    DecisionType::Recheck,
                    "evaluating",
                    "evaluating failover candidate",
                    Some(current),
                    Some(candidate),
                    samples,
                    scores,
                    0,
                    true,
                    None,
                    now,
                )
            }
        }
    }

    async fn try_commit(&self, to: &str) -> CoreResult<()> {
        self.adapter.set_member_weight(to, 100).await?;
        self.adapter.reload_policy().await
    }

    /// Forces re-evaluation against the highest-preference eligible member,
    /// short-circuiting the margin/duration hysteresis. Backs `action.restore`
    /// — a command, not a hint: it fails only when there is no current
    /// primary or no eligible member to restore to.
    pub async fn force_restore(
        &self,
        members: &[Member],
        samples: &HashMap<String, MetricSample>,
        scores: &HashMap<String, Score>,
        now: DateTime<Utc>,
    ) -> CoreResult<DecisionRecord> {
        let current = self.current_primary().ok_or_else(|| CoreError::PreconditionFailed("no active primary to restore".into()))?;
        let (candidate, _) = self
            .best_eligible(members, scores, Some(&current))
            .ok_or_else(|| CoreError::PreconditionFailed("no eligible member available to restore to".into()))?;
        Ok(self
            .commit_switch(&current, &candidate, DecisionType::Restore, "restore", "restore: forced by operator action", samples, scores, now)
            .await)
    }

    /// Evaluates an operator's failover hint against eligibility and
    /// cooldowns; backs `action.failover` — a hint, not a command, so it
    /// rejects rather than commits when `to` doesn't qualify.
    pub async fn force_failover(
        &self,
        to: &str,
        samples: &HashMap<String, MetricSample>,
        scores: &HashMap<String, Score>,
        now: DateTime<Utc>,
    ) -> CoreResult<DecisionRecord> {
        let policy_members = self.adapter.list_policy_members().await?;
        if !policy_members.iter().any(|m| m.name == to) {
            return Err(CoreError::PreconditionFailed(format!("unknown member {to}")));
        }
        let current = self.current_primary();
        if current.as_deref() == Some(to) {
            return Err(CoreError::PreconditionFailed(format!("{to} is already the current primary")));
        }
        if !scores.get(to).map(|s| s.is_eligible()).unwrap_or(false) {
            return Err(CoreError::PreconditionFailed(format!("{to} is not currently eligible")));
        }
        if self.registry.get(to).is_some_and(|m| m.in_cooldown(now)) {
            return Err(CoreError::PreconditionFailed(format!("{to} is in cooldown")));
        }
        let from = current.unwrap_or_else(|| to.to_string());
        Ok(self
            .commit_switch(&from, to, DecisionType::Failover, "operator", "failover: forced by operator action", samples, scores, now)
            .await)
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit_switch(
        &self,
        from: &str,
        to: &str,
        decision_type: DecisionType,
        trigger: &str,
        reasoning: &str,
        samples: &HashMap<String, MetricSample>,
        scores: &HashMap<String, Score>,
        now: DateTime<Utc>,
    ) -> DecisionRecord {
        let started = Instant::now();
        let mut attempt = 0;
        let mut backoff_ms = self.config.commit_retry_backoff_ms;
        let mut last_err = None;

        while attempt < self.config.commit_max_attempts {
            attempt += 1;
            match self.try_commit(to).await {
                Ok(()) => {
                    *self.current_primary.write().expect("controller lock poisoned") = Some(to.to_string());
                    *self.state.write().expect("controller lock poisoned") = SwitchState::Steady;
                    *self.last_switch_at.write().expect("controller lock poisoned") = Some(now);
                    if let Some(member) = self.registry.get(from) {
                        self.registry.set_cooldown(from, now + chrono::Duration::seconds(member.hints.cooldown_s as i64));
                    }
                    return self.record(
                        decision_type,
                        trigger,
                        reasoning,
                        Some(from.to_string()),
                        Some(to.to_string()),
                        samples,
                        scores,
                        started.elapsed().as_millis() as u64,
                        true,
                        None,
                        now,
                    );
                }
                Err(err) => {
                    warn!(attempt, to, error = %err, "commit attempt failed");
                    last_err = Some("adapter_commit_failed".to_string());
                    if attempt < self.config.commit_max_attempts {
                        sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms * 2).min(self.config.commit_retry_backoff_max_ms);
                    }
                }
            }
        }

        *self.state.write().expect("controller lock poisoned") = SwitchState::Steady;
        self.record(
            decision_type,
            trigger,
            reasoning,
            Some(from.to_string()),
            Some(to.to_string()),
            samples,
            scores,
            started.elapsed().as_millis() as u64,
            false,
            last_err,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        decision_type: DecisionType,
        trigger: &str,
        reasoning: &str,
        from_member: Option<String>,
        to_member: Option<String>,
        samples: &HashMap<String, MetricSample>,
        scores: &HashMap<String, Score>,
        execution_duration_ms: u64,
        success: bool,
        error: Option<String>,
        ts: DateTime<Utc>,
    ) -> DecisionRecord {
        let confidence = to_member
            .as_ref()
            .and_then(|t| scores.get(t))
            .map(|s| (s.final_score / 100.0).clamp(0.0, 1.0))
            .unwrap_or(0.5);
        DecisionRecord {
            id: decision_id(),
            ts,
            decision_type,
            trigger: trigger.to_string(),
            from_member,
            to_member,
            reasoning: reasoning.to_string(),
            confidence,
            metrics_snapshot: samples.clone(),
            score_snapshot: scores.clone(),
            execution_duration_ms,
            success,
            error,
            root_cause_category: None,
            recommendations: vec![],
        }
    }
}
