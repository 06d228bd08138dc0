//! Scheduler (C10) — the fixed-tick loop binding registry, collectors,
//! scoring, predictors, and the switch controller together. Cancellation is
//! cooperative: a `watch` channel flip is observed between ticks, never
//! mid-tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use netwan_types::config::DaemonConfig;
use netwan_types::models::{ClassMetrics, Member, MemberClass, MetricSample, Pattern};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Ceiling on concurrent collector workers per tick, regardless of member
/// count — bounds fd/goroutine-style fan-out on routers with many uplinks.
const MAX_COLLECTOR_PARALLELISM: usize = 32;

use crate::auditor::DecisionAuditor;
use crate::collectors::Collector;
use crate::controller::SwitchController;
use crate::patterns;
use crate::predictors::Predictor;
use crate::registry::MemberRegistry;
use crate::scoring;
use crate::store::{DecisionLog, TelemetryStore};

pub struct Scheduler {
    registry: Arc<MemberRegistry>,
    store: Arc<TelemetryStore>,
    decision_log: Arc<DecisionLog>,
    auditor: Arc<DecisionAuditor>,
    controller: Arc<SwitchController>,
    collectors: HashMap<MemberClass, Arc<dyn Collector>>,
    predictors: HashMap<MemberClass, Box<dyn Predictor + Send + Sync>>,
    config: DaemonConfig,
    patterns: RwLock<Vec<Pattern>>,
    tick_count: AtomicU64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<MemberRegistry>,
        store: Arc<TelemetryStore>,
        decision_log: Arc<DecisionLog>,
        auditor: Arc<DecisionAuditor>,
        controller: Arc<SwitchController>,
        collectors: HashMap<MemberClass, Arc<dyn Collector>>,
        predictors: HashMap<MemberClass, Box<dyn Predictor + Send + Sync>>,
        config: DaemonConfig,
    ) -> Self {
        Self {
            registry,
            store,
            decision_log,
            auditor,
            controller,
            collectors,
            predictors,
            config,
            patterns: RwLock::new(Vec::new()),
            tick_count: AtomicU64::new(0),
        }
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.patterns.read().expect("scheduler lock poisoned").clone()
    }

    pub fn ticks(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    /// Runs ticks on a fixed interval until `shutdown` is set. Never
    /// interrupts a tick in progress; the shutdown signal is only observed
    /// between ticks.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.scheduler.tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
            }
        }
    }

    fn collector_for(&self, class: MemberClass) -> Option<Arc<dyn Collector>> {
        self.collectors.get(&class).cloned()
    }

    /// One full pass: discover -> collect -> score -> predict -> decide ->
    /// log, with `now` timestamping the tick end-to-end. Exposed directly
    /// (rather than only through [`Self::run`]) so a caller can drive single
    /// steps deterministically.
    pub async fn tick(&self) {
        self.tick_at(Utc::now()).await;
    }

    /// Same as [`Self::tick`] with an explicit clock, so tests can simulate
    /// elapsed wall time between ticks without sleeping in real time.
    pub async fn tick_at(&self, now: DateTime<Utc>) {
        let members = self.registry.refresh().await;
        for removed in self.registry.drain_removed() {
            self.store.remove_member(&removed);
        }

        let samples = self.collect_all(&members, now).await;

        let mut scores = HashMap::new();
        let mut signals = HashMap::new();

        for member in &members {
            let Some(sample) = samples.get(&member.name) else { continue };

            self.registry.record_liveness(&member.name, sample.link_up);
            self.store.append_sample(&member.name, sample.clone());

            let recent_instants: Vec<f64> = self.store.all_scores(&member.name).iter().map(|s| s.instant).collect();
            let prev_score = self.store.latest_score(&member.name);
            let score = scoring::compute(
                member,
                sample,
                prev_score.as_ref(),
                &recent_instants,
                &self.config.scoring.weights,
                self.config.scoring.data_cap_mode,
                self.config.scoring.ewma_alpha,
                self.config.scheduler.tick_interval_ms,
                self.config.scoring.min_final_for_eligibility,
                sample.ts,
            );
            self.store.append_score(&member.name, score);

            if let Some(predictor) = self.predictors.get(&member.class) {
                let history = self.store.all_samples(&member.name);
                signals.insert(member.name.clone(), predictor.evaluate(&history));
            }

            scores.insert(member.name.clone(), score);
        }

        let decision = self.controller.evaluate(&members, &samples, &scores, &signals, now).await;
        self.auditor.append(decision);

        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        if tick % self.config.scheduler.housekeeping_every_ticks.max(1) as u64 == 0 {
            self.housekeeping();
        }
    }

    /// Fans the tick's collector calls out as concurrent workers under one
    /// shared deadline, bounded by a parallelism cap (member count, ceiling
    /// [`MAX_COLLECTOR_PARALLELISM`]). A collector panic is absorbed as a
    /// degraded sample rather than failing the tick.
    async fn collect_all(&self, members: &[Member], now: DateTime<Utc>) -> HashMap<String, MetricSample> {
        let timeout = Duration::from_millis(self.config.collectors.probe_timeout_ms);
        let cap = members.len().clamp(1, MAX_COLLECTOR_PARALLELISM);
        let semaphore = Arc::new(Semaphore::new(cap));

        let mut tasks = JoinSet::new();
        for member in members.iter().cloned() {
            let collector = self.collector_for(member.class);
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("collector semaphore closed");
                let sample = match collector {
                    Some(collector) => collector.collect(&member, timeout).await,
                    None => MetricSample::degraded(now, ClassMetrics::Generic),
                };
                (member.name, sample)
            });
        }

        let mut samples = HashMap::with_capacity(members.len());
        while let Some(result) = tasks.join_next().await {
            if let Ok((name, sample)) = result {
                samples.insert(name, sample);
            }
        }
        samples
    }

    fn housekeeping(&self) {
        self.store.enforce_memory_cap();
        let records = self.decision_log.all();
        let detected = patterns::analyze(&records);
        if !detected.is_empty() {
            info!(count = detected.len(), "detected patterns in decision history");
        }
        *self.patterns.write().expect("scheduler lock poisoned") = detected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ExecOutput, PolicyMember, RouterAdapter};
    use async_trait::async_trait;
    use netwan_types::error::CoreResult;
    use std::sync::Mutex;

    struct FakeAdapter {
        members: Mutex<Vec<PolicyMember>>,
    }

    #[async_trait]
    impl RouterAdapter for FakeAdapter {
        async fn list_policy_members(&self) -> CoreResult<Vec<PolicyMember>> {
            Ok(self.members.lock().unwrap().clone())
        }
        async fn set_member_weight(&self, _: &str, _: u32) -> CoreResult<()> {
            Ok(())
        }
        async fn set_member_metric(&self, _: &str, _: u32) -> CoreResult<()> {
            Ok(())
        }
        async fn reload_policy(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn config_get(&self, _: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        async fn config_set(&self, _: &str, _: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn config_commit(&self, _: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn bus_call(&self, _: &str, _: &str, _: serde_json::Value) -> CoreResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn exec(&self, _: &str, _: &[String], _: Duration) -> CoreResult<ExecOutput> {
            Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit: 0,
            })
        }
    }

    struct FixedCollector;

    #[async_trait]
    impl Collector for FixedCollector {
        async fn collect(&self, _member: &Member, _timeout: Duration) -> MetricSample {
            MetricSample {
                ts: Utc::now(),
                latency_ms: 20.0,
                loss_pct: 0.0,
                jitter_ms: 1.0,
                reachable: true,
                link_up: true,
                class_metrics: ClassMetrics::Generic,
            }
        }
    }

    fn policy(name: &str) -> PolicyMember {
        PolicyMember {
            name: name.to_string(),
            class_hint: Some("lan".into()),
            iface: "eth0".into(),
            weight: 100,
            metered: false,
            prefer_roaming: false,
            min_uptime_s: 0,
            cooldown_s: 5,
        }
    }

    fn scheduler() -> Scheduler {
        let adapter = Arc::new(FakeAdapter {
            members: Mutex::new(vec![policy("wan_a"), policy("wan_b")]),
        });
        let registry = Arc::new(MemberRegistry::new(adapter.clone(), 5));
        let store = Arc::new(TelemetryStore::new(60, 16 * 1024 * 1024));
        let decision_log = Arc::new(DecisionLog::new(100));
        let auditor = Arc::new(DecisionAuditor::new(decision_log.clone()));
        let controller = Arc::new(SwitchController::new(adapter.clone(), registry.clone(), Default::default()));

        let mut collectors: HashMap<MemberClass, Arc<dyn Collector>> = HashMap::new();
        collectors.insert(MemberClass::Lan, Arc::new(FixedCollector));

        Scheduler::new(registry, store, decision_log, auditor, controller, collectors, HashMap::new(), DaemonConfig::default())
    }

    #[tokio::test]
    async fn a_tick_discovers_collects_scores_and_decides() {
        let scheduler = scheduler();
        scheduler.tick().await;
        assert_eq!(scheduler.ticks(), 1);
        assert!(scheduler.decision_log.len() >= 1);
        assert!(scheduler.store.latest_sample("wan_a").is_some());
        assert!(scheduler.store.latest_score("wan_a").is_some());
    }

    #[tokio::test]
    async fn housekeeping_runs_on_schedule() {
        let mut scheduler = scheduler();
        scheduler.config.scheduler.housekeeping_every_ticks = 2;
        for _ in 0..2 {
            scheduler.tick().await;
        }
        assert_eq!(scheduler.ticks(), 2);
    }
}
