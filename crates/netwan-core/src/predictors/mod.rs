//! Predictors (C6) — class-specific trend/risk predictors built on the
//! shared [`regression`] module. A predictor signals
//! [`PredictorSignal::should_failover`] only when the underlying fit has
//! `r² ≥ 0.3` and the slope crosses the class's own threshold; below that
//! gate, a signal is advisory only (surfaced for the status/events RPC but
//! not treated as a switch trigger by the controller).

pub mod regression;

mod cellular;
mod starlink;
mod wifi;

pub use cellular::CellularPredictor;
pub use starlink::StarlinkPredictor;
pub use wifi::WifiPredictor;

/// Minimum r² for a regression-based predictor to trust its slope, per §4.6.
pub const MIN_R2: f64 = 0.3;

/// A risk signal raised by a predictor for one member in one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorSignal {
    pub reason: String,
    /// Whether this signal alone is sufficient grounds for a predictive
    /// failover, or merely advisory (e.g. Wi-Fi interference risk).
    pub failover_eligible: bool,
}

impl PredictorSignal {
    pub fn failover(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            failover_eligible: true,
        }
    }

    pub fn advisory(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            failover_eligible: false,
        }
    }
}

/// Implemented by each class predictor; called once per member per tick
/// with that member's recent samples (oldest first, already windowed to
/// [`regression::MAX_WINDOW`] by the caller).
pub trait Predictor {
    fn evaluate(&self, samples: &[netwan_types::models::MetricSample]) -> Vec<PredictorSignal>;
}
