//! End-to-end scenarios exercising the decision pipeline (registry through
//! scheduler) against scripted adapters and collectors rather than real
//! hosts, following the same fake-adapter style as the unit tests in
//! `controller.rs` and `scheduler.rs`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use netwan_core::adapters::{ExecOutput, PolicyMember, RouterAdapter};
use netwan_core::auditor::DecisionAuditor;
use netwan_core::collectors::Collector;
use netwan_core::controller::SwitchController;
use netwan_core::patterns;
use netwan_core::predictors::{CellularPredictor, Predictor, StarlinkPredictor};
use netwan_core::registry::MemberRegistry;
use netwan_core::scheduler::Scheduler;
use netwan_core::store::{DecisionLog, TelemetryStore};
use netwan_types::config::{ControllerConfig, DaemonConfig};
use netwan_types::error::{CoreError, CoreResult};
use netwan_types::models::{
    CellularMetrics, ClassMetrics, DecisionRecord, DecisionType, Member, MemberClass, MetricSample,
    Pattern, PatternMetrics, PatternType, Score, StarlinkMetrics,
};

fn policy(name: &str, class_hint: &str, iface: &str, weight: u32, metered: bool) -> PolicyMember {
    PolicyMember {
        name: name.to_string(),
        class_hint: Some(class_hint.to_string()),
        iface: iface.to_string(),
        weight,
        metered,
        prefer_roaming: false,
        min_uptime_s: 0,
        cooldown_s: 0,
    }
}

/// A `RouterAdapter` whose policy listing and commit behaviour are driven
/// entirely by the test, mirroring `FakeAdapter` in `controller.rs`/
/// `scheduler.rs` but with a few extra knobs shared across scenarios.
struct FakeAdapter {
    members: Mutex<Vec<PolicyMember>>,
    unavailable: AtomicBool,
    weight_calls: AtomicU32,
    fail_first_n_weight_calls: AtomicU32,
    commits: AtomicU32,
}

impl FakeAdapter {
    fn new(members: Vec<PolicyMember>) -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(members),
            unavailable: AtomicBool::new(false),
            weight_calls: AtomicU32::new(0),
            fail_first_n_weight_calls: AtomicU32::new(0),
            commits: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl RouterAdapter for FakeAdapter {
    async fn list_policy_members(&self) -> CoreResult<Vec<PolicyMember>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::AdapterUnavailable("policy bus down".into()));
        }
        Ok(self.members.lock().unwrap().clone())
    }
    async fn set_member_weight(&self, _name: &str, _weight: u32) -> CoreResult<()> {
        let call = self.weight_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first_n_weight_calls.load(Ordering::SeqCst) {
            return Err(CoreError::AdapterUnavailable("commit bus timeout".into()));
        }
        Ok(())
    }
    async fn set_member_metric(&self, _: &str, _: u32) -> CoreResult<()> {
        Ok(())
    }
    async fn reload_policy(&self) -> CoreResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
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
        Ok(ExecOutput { stdout: String::new(), stderr: String::new(), exit: 0 })
    }
}

/// A `Collector` that replays a scripted sequence of samples, one per call,
/// and repeats its last sample once the script is exhausted.
struct ScriptedCollector {
    script: Mutex<VecDeque<MetricSample>>,
    last: Mutex<Option<MetricSample>>,
}

impl ScriptedCollector {
    fn new(samples: Vec<MetricSample>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(samples.into()), last: Mutex::new(None) })
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    async fn collect(&self, _member: &Member, _timeout: Duration) -> MetricSample {
        let mut script = self.script.lock().unwrap();
        let sample = script.pop_front().or_else(|| self.last.lock().unwrap().clone()).expect("scripted collector exhausted with no prior sample");
        *self.last.lock().unwrap() = Some(sample.clone());
        sample
    }
}

fn starlink_sample(obstruction_pct: f64, loss_pct: f64, latency_ms: f64) -> MetricSample {
    MetricSample {
        ts: Utc::now(),
        latency_ms,
        loss_pct,
        jitter_ms: 1.0,
        reachable: true,
        link_up: true,
        class_metrics: ClassMetrics::Starlink(StarlinkMetrics {
            obstruction_pct,
            snr_db: 9,
            ..Default::default()
        }),
    }
}

fn cellular_sample(rsrp_dbm: f64, loss_pct: f64, latency_ms: f64) -> MetricSample {
    MetricSample {
        ts: Utc::now(),
        latency_ms,
        loss_pct,
        jitter_ms: 2.0,
        reachable: true,
        link_up: true,
        class_metrics: ClassMetrics::Cellular(CellularMetrics {
            rsrp_dbm,
            rsrq_db: -10.0,
            sinr_db: 12.0,
            band: "B3".into(),
            technology: "LTE".into(),
            roaming: false,
            timing_advance: None,
            signal_strength_dbm: rsrp_dbm,
        }),
    }
}

fn build_scheduler(
    adapter: Arc<FakeAdapter>,
    collectors: HashMap<MemberClass, Arc<dyn Collector>>,
    predictors: HashMap<MemberClass, Box<dyn Predictor + Send + Sync>>,
    controller_config: ControllerConfig,
) -> (Arc<Scheduler>, Arc<DecisionLog>, Arc<SwitchController>) {
    let registry = Arc::new(MemberRegistry::new(adapter.clone(), 10));
    let store = Arc::new(TelemetryStore::new(64, 16 * 1024 * 1024));
    let decision_log = Arc::new(DecisionLog::new(500));
    let auditor = Arc::new(DecisionAuditor::new(decision_log.clone()));
    let controller = Arc::new(SwitchController::new(adapter.clone(), registry.clone(), controller_config));
    let config = DaemonConfig::default();

    let scheduler = Arc::new(Scheduler::new(registry, store, decision_log.clone(), auditor, controller.clone(), collectors, predictors, config));
    (scheduler, decision_log, controller)
}

/// Scenario 1: a Starlink member's obstruction trend accelerates past the
/// predictor's threshold and the controller fails over to cellular before
/// the score itself would have forced the issue through plain hysteresis.
#[tokio::test]
async fn starlink_obstruction_predictive_failover() {
    let adapter = FakeAdapter::new(vec![
        policy("wan_sl", "starlink", "stl0", 100, false),
        policy("wan_lte", "cellular", "wwan0", 80, true),
    ]);

    let obstruction_series = [2.0, 4.0, 7.0, 11.0, 16.0, 22.0];
    let starlink_collector = ScriptedCollector::new(obstruction_series.iter().map(|&pct| starlink_sample(pct, 0.0, 60.0)).collect());
    let cellular_collector = ScriptedCollector::new(vec![cellular_sample(-85.0, 0.5, 80.0)]);

    let mut collectors: HashMap<MemberClass, Arc<dyn Collector>> = HashMap::new();
    collectors.insert(MemberClass::Starlink, starlink_collector);
    collectors.insert(MemberClass::Cellular, cellular_collector);

    let mut predictors: HashMap<MemberClass, Box<dyn Predictor + Send + Sync>> = HashMap::new();
    predictors.insert(MemberClass::Starlink, Box::new(StarlinkPredictor));
    predictors.insert(MemberClass::Cellular, Box::new(CellularPredictor));

    let (scheduler, decision_log, controller) = build_scheduler(adapter, collectors, predictors, ControllerConfig::default());

    for _ in 0..obstruction_series.len() {
        scheduler.tick().await;
    }

    assert_eq!(controller.current_primary(), Some("wan_lte".to_string()));
    let failover = decision_log
        .all()
        .into_iter()
        .find(|d| d.decision_type == DecisionType::Failover)
        .expect("predictive failover should have been recorded");
    assert!(failover.success);
    assert_eq!(failover.trigger, "predictive");
    assert_eq!(failover.from_member.as_deref(), Some("wan_sl"));
    assert_eq!(failover.to_member.as_deref(), Some("wan_lte"));
    assert!(failover.reasoning.contains("obstruction acceleration"), "reasoning was: {}", failover.reasoning);
}

/// Scenario 2: two members stay within the configured switch margin of
/// each other; hysteresis must never escalate that gap into a switch.
#[tokio::test]
async fn close_scores_never_flap() {
    let adapter = FakeAdapter::new(vec![policy("wan_a", "lan", "eth0", 100, false), policy("wan_b", "lan", "eth1", 100, false)]);
    let registry = Arc::new(MemberRegistry::new(adapter.clone(), 5));
    let mut config = ControllerConfig::default();
    config.switch_margin = 10.0;
    let controller = SwitchController::new(adapter.clone(), registry.clone(), config);

    let members = registry.refresh().await;
    let samples = HashMap::from([("wan_a".into(), starlink_sample(0.0, 0.0, 20.0)), ("wan_b".into(), starlink_sample(0.0, 0.0, 20.0))]);
    let scores = HashMap::from([("wan_a".into(), fixed_score(78.0)), ("wan_b".into(), fixed_score(79.0))]);
    let signals = HashMap::new();
    let now = Utc::now();

    for _ in 0..3 {
        let decision = controller.evaluate(&members, &samples, &scores, &signals, now).await;
        assert_eq!(decision.decision_type, DecisionType::Noop, "a sub-margin gap must never produce a switch decision");
    }
}

fn fixed_score(final_score: f64) -> Score {
    Score {
        instant: final_score,
        ewma: final_score,
        window_avg: final_score,
        final_score,
        eligible_at: Some(Utc::now()),
    }
}

/// Scenario 3: the current (lower-weight) member stays on a recovered,
/// higher-weight member long enough to trigger the restore path rather
/// than a plain failover.
#[tokio::test]
async fn failback_after_restore_window() {
    let adapter = FakeAdapter::new(vec![
        policy("wan_sl", "starlink", "stl0", 100, false),
        policy("wan_lte", "cellular", "wwan0", 80, true),
    ]);

    // wan_sl starts heavily obstructed so the initial bootstrap lands on
    // wan_lte, then recovers and holds a clean signal for the rest of the run.
    let mut starlink_script = vec![starlink_sample(60.0, 5.0, 120.0)];
    starlink_script.extend((0..25).map(|_| starlink_sample(0.2, 0.0, 55.0)));
    let starlink_collector = ScriptedCollector::new(starlink_script);
    let cellular_collector = ScriptedCollector::new(vec![cellular_sample(-85.0, 0.5, 80.0)]);

    let mut collectors: HashMap<MemberClass, Arc<dyn Collector>> = HashMap::new();
    collectors.insert(MemberClass::Starlink, starlink_collector);
    collectors.insert(MemberClass::Cellular, cellular_collector);

    let mut predictors: HashMap<MemberClass, Box<dyn Predictor + Send + Sync>> = HashMap::new();
    predictors.insert(MemberClass::Starlink, Box::new(StarlinkPredictor));

    let mut controller_config = ControllerConfig::default();
    controller_config.restore_min_duration_s = 30;
    controller_config.min_dwell_ms = 0;
    let tick_interval_ms = 1_500i64;

    let (scheduler, decision_log, controller) = build_scheduler(adapter, collectors, predictors, controller_config);

    // Ticks are driven on a simulated clock advancing by the scheduler's own
    // tick interval, so the restore window's 30 s duration check elapses
    // deterministically instead of depending on real wall-clock time.
    let mut cursor = Utc::now();
    scheduler.tick_at(cursor).await;
    assert_eq!(controller.current_primary(), Some("wan_lte".to_string()), "the obstructed dish must not win the initial bootstrap");

    for _ in 0..24 {
        cursor = cursor + chrono::Duration::milliseconds(tick_interval_ms);
        scheduler.tick_at(cursor).await;
    }

    assert_eq!(controller.current_primary(), Some("wan_sl".to_string()));
    let restore = decision_log
        .all()
        .into_iter()
        .find(|d| d.decision_type == DecisionType::Restore)
        .expect("a restore decision should have been recorded once the dish recovered");
    assert!(restore.success);
    assert_eq!(restore.trigger, "restore");
    assert_eq!(restore.from_member.as_deref(), Some("wan_lte"));
    assert_eq!(restore.to_member.as_deref(), Some("wan_sl"));
}

/// Scenario 4: the adapter's commit call fails repeatedly; each attempt is
/// recorded as a failed decision and the eventual successful attempt
/// follows once the adapter recovers.
#[tokio::test]
async fn commit_failures_are_recorded_then_recovered() {
    let adapter = FakeAdapter::new(vec![]);
    adapter.fail_first_n_weight_calls.store(3, Ordering::SeqCst);
    let registry = Arc::new(MemberRegistry::new(adapter.clone(), 5));

    let mut config = ControllerConfig::default();
    config.degraded_threshold = 40.0;
    config.switch_margin = 8.0;
    config.fail_min_duration_s = 1;
    config.commit_max_attempts = 1;
    let controller = SwitchController::new(adapter.clone(), registry.clone(), config);

    let members = vec![test_member("wan_a", 100), test_member("wan_b", 100)];
    let samples = HashMap::from([("wan_a".into(), starlink_sample(0.0, 0.0, 20.0)), ("wan_b".into(), starlink_sample(0.0, 0.0, 20.0))]);
    let signals = HashMap::new();
    let mut cursor = Utc::now();

    let good = HashMap::from([("wan_a".into(), fixed_score(90.0)), ("wan_b".into(), fixed_score(50.0))]);
    let decision = controller.evaluate(&members, &samples, &good, &signals, cursor).await;
    assert_eq!(controller.current_primary(), Some("wan_a".to_string()));
    assert_eq!(decision.decision_type, DecisionType::Noop);

    // Each call advances the simulated clock by 2s, so the 1s fail-window
    // duration elapses deterministically on the step after entering
    // EVALUATING rather than depending on real wall-clock time.
    let degraded = HashMap::from([("wan_a".into(), fixed_score(10.0)), ("wan_b".into(), fixed_score(90.0))]);
    let mut recorded = Vec::new();
    for _ in 0..12 {
        cursor = cursor + chrono::Duration::seconds(2);
        let d = controller.evaluate(&members, &samples, &degraded, &signals, cursor).await;
        if d.decision_type == DecisionType::Failover {
            recorded.push(d);
        }
        if controller.current_primary().as_deref() == Some("wan_b") {
            break;
        }
    }

    let failed: Vec<_> = recorded.iter().filter(|d| !d.success).collect();
    assert_eq!(failed.len(), 3, "exactly three commit attempts should have failed before the adapter recovered");
    assert!(failed.iter().all(|d| d.error.is_some()));
    assert!(failed.iter().all(|d| d.error.as_deref() == Some("adapter_commit_failed")));
    let succeeded = recorded.iter().filter(|d| d.success).count();
    assert_eq!(succeeded, 1);
    assert_eq!(controller.current_primary(), Some("wan_b".to_string()));
}

fn test_member(name: &str, weight: u32) -> Member {
    use netwan_types::models::PolicyHints;
    Member {
        name: name.to_string(),
        class: MemberClass::Generic,
        iface: "eth0".into(),
        weight,
        eligible: true,
        created_at: Utc::now(),
        hints: PolicyHints::default(),
        missed_refreshes: 0,
        consecutive_up_ticks: 1000,
        cooldown_until: None,
        last_failure_at: None,
    }
}

/// Scenario 5: a run of failovers spaced tightly (and regularly) enough in
/// time is flagged as a cyclic pattern rather than independent events.
#[test]
fn repeated_failovers_are_flagged_as_a_cyclic_pattern() {
    let base = Utc::now();
    let mut records = Vec::new();
    let mut cursor = base;
    for i in 0..50 {
        // Alternate +/- 15s around a 720s mean (720/15 => CV well under 0.3).
        let offset = if i % 2 == 0 { 705 } else { 735 };
        cursor = cursor + chrono::Duration::seconds(offset);
        records.push(DecisionRecord {
            id: format!("dec_{i}"),
            ts: cursor,
            decision_type: DecisionType::Failover,
            trigger: "failover".into(),
            from_member: Some("wan_a".into()),
            to_member: Some("wan_b".into()),
            reasoning: "flapping".into(),
            confidence: 0.9,
            metrics_snapshot: HashMap::new(),
            score_snapshot: HashMap::new(),
            execution_duration_ms: 10,
            success: true,
            error: None,
            root_cause_category: None,
            recommendations: vec![],
        });
    }

    let detected = patterns::analyze(&records);
    let cyclic: Vec<&Pattern> = detected.iter().filter(|p| p.pattern_type == PatternType::Cyclic).collect();
    assert_eq!(cyclic.len(), 1, "exactly one cyclic pattern should be detected across the single failover/failover pair");

    let pattern = cyclic[0];
    assert!(pattern.confidence >= 0.95, "confidence was {}", pattern.confidence);
    match &pattern.metrics {
        PatternMetrics::Cyclic { avg_interval_s, n } => {
            assert!((*avg_interval_s - 720.0).abs() < 1.0, "avg interval was {avg_interval_s}");
            assert_eq!(*n, 50);
        }
        other => panic!("expected cyclic metrics, got {other:?}"),
    }
}

/// Scenario 6: the host's policy bus is unavailable from the start. The
/// scheduler keeps ticking, never picks a primary, and never records a
/// successful switch — the daemon stays in observation-only mode.
#[tokio::test]
async fn unavailable_adapter_keeps_the_daemon_observing() {
    let adapter = FakeAdapter::new(vec![policy("wan_a", "lan", "eth0", 100, false), policy("wan_b", "lan", "eth1", 100, false)]);
    adapter.unavailable.store(true, Ordering::SeqCst);

    let mut collectors: HashMap<MemberClass, Arc<dyn Collector>> = HashMap::new();
    collectors.insert(MemberClass::Lan, ScriptedCollector::new(vec![starlink_sample(0.0, 0.0, 20.0)]));
    collectors.insert(MemberClass::Generic, ScriptedCollector::new(vec![starlink_sample(0.0, 0.0, 20.0)]));

    let (scheduler, decision_log, controller) = build_scheduler(adapter.clone(), collectors, HashMap::new(), ControllerConfig::default());

    for _ in 0..5 {
        scheduler.tick().await;
    }

    assert_eq!(controller.current_primary(), None, "no member can ever be promoted to primary without a policy listing");
    assert!(decision_log.all().iter().all(|d| d.success && d.decision_type == DecisionType::Noop));

    match adapter.list_policy_members().await {
        Err(err) => assert!(matches!(err, CoreError::AdapterUnavailable(_))),
        Ok(_) => panic!("adapter was configured unavailable"),
    }
}
