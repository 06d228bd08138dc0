//! Local RPC surface (§6) — a small JSON/HTTP API over the daemon's
//! internal state, following the same axum/tower-http shape the fleet uses
//! for its onboarding portal: one `Router`, one shared `AppState`, CORS
//! permissive since this only ever binds to loopback or the LAN side.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;

use netwan_core::adapters::RouterAdapter;
use netwan_core::auditor::DecisionAuditor;
use netwan_core::controller::SwitchController;
use netwan_core::registry::MemberRegistry;
use netwan_core::scheduler::Scheduler;
use netwan_core::store::TelemetryStore;
use netwan_types::config::DaemonConfig;
use netwan_types::error::CoreError;
use netwan_types::models::{MetricSample, Score, SystemState};
use netwan_types::rpc::{
    ActionCommand, ActionRequest, ActionResult, EventsRequest, HistoryEntry, HistoryRequest,
    MemberScoreView, MemberView, MetricsRequest, MetricsResult, RankedMember, StatusResult,
};

pub struct AppState {
    pub registry: Arc<MemberRegistry>,
    pub store: Arc<TelemetryStore>,
    pub controller: Arc<SwitchController>,
    pub auditor: Arc<DecisionAuditor>,
    pub adapter: Arc<dyn RouterAdapter>,
    pub scheduler: Arc<Scheduler>,
    pub config: DaemonConfig,
}

pub async fn run(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/api/status", get(api_status))
        .route("/api/members", get(api_members))
        .route("/api/metrics", get(api_metrics))
        .route("/api/history", get(api_history))
        .route("/api/events", get(api_events))
        .route("/api/action", post(api_action))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    info!(%addr, "rpc surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn system_state(controller: &SwitchController, rank: &[RankedMember]) -> SystemState {
    if controller.is_evaluating() {
        return SystemState::Degraded;
    }
    match controller.current_primary() {
        None => SystemState::Observing,
        Some(primary) => {
            let is_top = rank
                .iter()
                .max_by(|a, b| a.final_score.partial_cmp(&b.final_score).unwrap())
                .map(|top| top.name == primary)
                .unwrap_or(false);
            if is_top {
                SystemState::Primary
            } else {
                SystemState::Backup
            }
        }
    }
}

async fn api_status(State(state): State<Arc<AppState>>) -> Json<StatusResult> {
    let members = state.registry.snapshot();
    let rank: Vec<RankedMember> = members
        .iter()
        .map(|m| {
            let score = state.store.latest_score(&m.name);
            RankedMember {
                name: m.name.clone(),
                class: m.class,
                final_score: score.map(|s| s.final_score).unwrap_or(0.0),
                eligible: score.map(|s| s.is_eligible()).unwrap_or(false) && m.eligible,
            }
        })
        .collect();

    let current = state.controller.current_primary();
    let last_event = state.auditor.recent(None, 1).into_iter().next();
    let overall = system_state(&state.controller, &rank);

    Json(StatusResult {
        state: overall,
        current,
        rank,
        last_event,
        config: state.config.clone(),
    })
}

async fn api_members(State(state): State<Arc<AppState>>) -> Json<Vec<MemberView>> {
    let members = state.registry.snapshot();
    let views = members
        .into_iter()
        .map(|m| {
            let score = state.store.latest_score(&m.name);
            let metrics = state.store.latest_sample(&m.name);
            MemberView {
                name: m.name.clone(),
                class: m.class,
                iface: m.iface,
                eligible: m.eligible,
                score: MemberScoreView {
                    instant: score.map(|s| s.instant).unwrap_or(0.0),
                    ewma: score.map(|s| s.ewma).unwrap_or(0.0),
                    final_score: score.map(|s| s.final_score).unwrap_or(0.0),
                },
                last_update: metrics.as_ref().map(|s| s.ts),
                metrics,
            }
        })
        .collect();
    Json(views)
}

async fn api_metrics(
    State(state): State<Arc<AppState>>,
    Query(req): Query<MetricsRequest>,
) -> Json<MetricsResult> {
    let samples = state.store.all_samples(&req.name);
    Json(MetricsResult {
        name: req.name,
        samples,
    })
}

async fn api_history(
    State(state): State<Arc<AppState>>,
    Query(req): Query<HistoryRequest>,
) -> Json<Vec<HistoryEntry>> {
    // Samples and scores are appended in lockstep once per tick, so the two
    // rings stay the same length and index-aligned; filter the zipped pairs
    // together rather than filtering the sample ring alone, which would
    // desync them against the unfiltered score ring.
    let since = req.since_s.map(|s| Utc::now() - chrono::Duration::seconds(s as i64));
    let samples = state.store.all_samples(&req.name);
    let scores = state.store.all_scores(&req.name);

    let entries = samples
        .into_iter()
        .zip(scores)
        .filter(|(sample, _)| since.map_or(true, |since| sample.ts >= since))
        .map(|(sample, score)| HistoryEntry { score, sample })
        .collect();
    Json(entries)
}

async fn api_events(
    State(state): State<Arc<AppState>>,
    Query(req): Query<EventsRequest>,
) -> Json<Vec<netwan_types::models::DecisionRecord>> {
    let limit = req.limit.unwrap_or(50);
    Json(state.auditor.recent(None, limit))
}

/// Maps a controller/adapter failure to the RPC's error literal. Spec scenario
/// 6 requires `adapter_unavailable` verbatim when the adapter is down; every
/// other variant surfaces its descriptive message instead.
fn action_error(err: CoreError) -> String {
    match err {
        CoreError::AdapterUnavailable(_) => "adapter_unavailable".to_string(),
        other => other.to_string(),
    }
}

/// Snapshots the latest sample and score per currently known member, the
/// same inputs the scheduler feeds the controller each tick, so a forced
/// restore/failover evaluates against current state rather than stale data.
fn latest_samples_and_scores(state: &AppState) -> (HashMap<String, MetricSample>, HashMap<String, Score>) {
    let members = state.registry.snapshot();
    let mut samples = HashMap::with_capacity(members.len());
    let mut scores = HashMap::with_capacity(members.len());
    for member in &members {
        if let Some(sample) = state.store.latest_sample(&member.name) {
            samples.insert(member.name.clone(), sample);
        }
        if let Some(score) = state.store.latest_score(&member.name) {
            scores.insert(member.name.clone(), score);
        }
    }
    (samples, scores)
}

async fn api_action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionRequest>,
) -> impl IntoResponse {
    match req.cmd {
        ActionCommand::Recheck => {
            // Triggers an immediate out-of-band collector cycle rather than
            // waiting for the next scheduled tick, without changing state.
            state.scheduler.tick().await;
            (StatusCode::OK, Json(ActionResult::accepted()))
        }
        ActionCommand::Restore => {
            let members = state.registry.snapshot();
            let (samples, scores) = latest_samples_and_scores(&state);
            match state.controller.force_restore(&members, &samples, &scores, Utc::now()).await {
                Ok(decision) if decision.success => (StatusCode::OK, Json(ActionResult::accepted())),
                Ok(decision) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ActionResult::rejected(decision.error.unwrap_or_else(|| "adapter_commit_failed".to_string()))),
                ),
                Err(err) => (StatusCode::CONFLICT, Json(ActionResult::rejected(action_error(err)))),
            }
        }
        ActionCommand::Failover => match req.name {
            Some(name) => {
                let (samples, scores) = latest_samples_and_scores(&state);
                match state.controller.force_failover(&name, &samples, &scores, Utc::now()).await {
                    Ok(decision) if decision.success => (StatusCode::OK, Json(ActionResult::accepted())),
                    Ok(decision) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(ActionResult::rejected(decision.error.unwrap_or_else(|| "adapter_commit_failed".to_string()))),
                    ),
                    Err(err) => (StatusCode::CONFLICT, Json(ActionResult::rejected(action_error(err)))),
                }
            }
            None => (StatusCode::BAD_REQUEST, Json(ActionResult::rejected("failover requires a target member name"))),
        },
    }
}
