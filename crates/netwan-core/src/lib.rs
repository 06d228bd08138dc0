//! Decision pipeline for the multi-WAN failover daemon: member discovery,
//! per-class collectors, the scoring engine, trend predictors, pattern
//! analysis over the decision history, the hysteresis switch controller,
//! the decision auditor, and the scheduler that ties them together on a
//! fixed tick. Host integration (the real router adapter, the RPC surface,
//! process wiring) lives in `netwan-agent`.

pub mod adapters;
pub mod auditor;
pub mod collectors;
pub mod controller;
pub mod net;
pub mod patterns;
pub mod predictors;
pub mod registry;
pub mod scheduler;
pub mod scoring;
pub mod store;
