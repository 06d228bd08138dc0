//! netwan-agent
//!
//! Autonomous multi-WAN failover daemon for edge routers.
//!
//! - Discovers Starlink/cellular/Wi-Fi/LAN uplinks from the host's
//!   multi-WAN policy
//! - Collects per-class health metrics on a fixed tick and scores them
//! - Predicts member degradation ahead of hard failure
//! - Drives a hysteresis switch controller that commits failovers through
//!   the host's router adapter
//! - Serves a local JSON RPC surface for status, history, and manual action
//! - In `--simulate` mode, runs entirely against fake host/dish data for
//!   local development

mod adapters;
mod rpc;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use netwan_core::adapters::{RouterAdapter, StarlinkClient};
use netwan_core::auditor::DecisionAuditor;
use netwan_core::collectors::{CellularCollector, Collector, GenericCollector, StarlinkCollector, WifiCollector};
use netwan_core::controller::SwitchController;
use netwan_core::predictors::{CellularPredictor, Predictor, StarlinkPredictor, WifiPredictor};
use netwan_core::registry::MemberRegistry;
use netwan_core::scheduler::Scheduler;
use netwan_core::store::{DecisionLog, TelemetryStore};
use netwan_types::config::DaemonConfig;
use netwan_types::models::MemberClass;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::adapters::mock::{MockAdapter, MockStarlinkClient};
use crate::adapters::shell::{ShellAdapter, ShellStarlinkClient};
use crate::rpc::AppState;

/// netwan-agent daemon.
#[derive(Parser, Debug)]
#[command(name = "netwan-agent", about = "Autonomous multi-WAN failover daemon")]
struct Cli {
    /// Path to a TOML config file; defaults are used for anything it omits.
    #[arg(long)]
    config: Option<String>,

    /// Run against simulated hardware instead of shelling out to ubus/uci/dish.
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Override the RPC surface's bind address from the config file.
    #[arg(long)]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
            DaemonConfig::from_toml_str(&raw)?
        }
        None => DaemonConfig::default(),
    };
    if let Some(bind_addr) = cli.bind_addr {
        config.rpc.bind_addr = bind_addr;
    }
    config.validate()?;

    tracing::info!(simulate = cli.simulate, bind_addr = %config.rpc.bind_addr, "netwan-agent starting");

    let probe_timeout = Duration::from_millis(config.collectors.probe_timeout_ms);

    let adapter: Arc<dyn RouterAdapter> = if cli.simulate {
        Arc::new(MockAdapter::new())
    } else {
        Arc::new(ShellAdapter::new(probe_timeout))
    };
    let starlink_client: Arc<dyn StarlinkClient> = if cli.simulate {
        Arc::new(MockStarlinkClient)
    } else {
        Arc::new(ShellStarlinkClient::new(config.collectors.starlink_grpc_endpoint.clone()))
    };

    let registry = Arc::new(MemberRegistry::new(adapter.clone(), config.scheduler.member_stale_after_ticks));
    let store = Arc::new(TelemetryStore::new(config.store.ring_capacity, 64 * 1024 * 1024));
    let decision_log = Arc::new(DecisionLog::new(config.store.decision_log_capacity));
    let controller = Arc::new(SwitchController::new(adapter.clone(), registry.clone(), config.controller.clone()));
    let auditor = Arc::new(DecisionAuditor::new(decision_log.clone()));

    let mut collectors: HashMap<MemberClass, Arc<dyn Collector>> = HashMap::new();
    collectors.insert(MemberClass::Starlink, Arc::new(StarlinkCollector::new(starlink_client)));
    collectors.insert(MemberClass::Cellular, Arc::new(CellularCollector::new(adapter.clone())));
    collectors.insert(MemberClass::Wifi, Arc::new(WifiCollector::new(adapter.clone())));
    collectors.insert(MemberClass::Lan, Arc::new(GenericCollector::new(config.collectors.generic_probe_targets.clone())));
    collectors.insert(MemberClass::Generic, Arc::new(GenericCollector::new(config.collectors.generic_probe_targets.clone())));

    let mut predictors: HashMap<MemberClass, Box<dyn Predictor + Send + Sync>> = HashMap::new();
    predictors.insert(MemberClass::Starlink, Box::new(StarlinkPredictor));
    predictors.insert(MemberClass::Cellular, Box::new(CellularPredictor));
    predictors.insert(MemberClass::Wifi, Box::new(WifiPredictor));

    let scheduler = Arc::new(Scheduler::new(
        registry.clone(),
        store.clone(),
        decision_log.clone(),
        auditor.clone(),
        controller.clone(),
        collectors,
        predictors,
        config.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move { scheduler.run(shutdown_rx).await }
    });

    let rpc_state = Arc::new(AppState {
        registry,
        store,
        controller,
        auditor,
        adapter,
        scheduler: scheduler.clone(),
        config: config.clone(),
    });
    let bind_addr: SocketAddr = config
        .rpc
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid rpc.bind_addr {}: {e}", config.rpc.bind_addr))?;
    let rpc_handle = tokio::spawn(async move { rpc::run(rpc_state, bind_addr).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            let _ = shutdown_tx.send(true);
        }
        result = rpc_handle => {
            match result {
                Ok(Ok(())) => tracing::warn!("rpc server exited"),
                Ok(Err(e)) => tracing::error!("rpc server failed: {e}"),
                Err(e) => tracing::error!("rpc task panicked: {e}"),
            }
            let _ = shutdown_tx.send(true);
        }
    }

    if let Err(e) = scheduler_handle.await {
        tracing::error!("scheduler task failed: {e}");
    }

    tracing::info!("netwan-agent stopped");
    Ok(())
}
