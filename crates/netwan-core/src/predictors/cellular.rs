use netwan_types::models::{ClassMetrics, MetricSample};

use super::regression::{fit, window};
use super::{PredictorSignal, Predictor, MIN_R2};

/// Owns RSRP/SINR for cellular members; unlike Starlink and Wi-Fi this
/// class has a single combined signal rather than separate failover and
/// advisory paths.
pub struct CellularPredictor;

impl Predictor for CellularPredictor {
    fn evaluate(&self, samples: &[MetricSample]) -> Vec<PredictorSignal> {
        let mut rsrp = Vec::new();
        let mut last_sinr = None;
        for s in samples {
            if let ClassMetrics::Cellular(m) = &s.class_metrics {
                rsrp.push(m.rsrp_dbm);
                last_sinr = Some(m.sinr_db);
            }
        }

        let last_rsrp = rsrp.last().copied();
        let rsrp_window = window(&rsrp);
        let trending_down = fit(rsrp_window)
            .map(|reg| reg.r2 >= MIN_R2 && reg.slope < -3.0)
            .unwrap_or(false);

        let below_floor = last_rsrp.map(|r| r < -110.0).unwrap_or(false);
        let poor_sinr = last_sinr.map(|s| s < 0.0).unwrap_or(false);

        if trending_down || below_floor || poor_sinr {
            vec![PredictorSignal::failover("cellular signal degradation")]
        } else {
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use netwan_types::models::CellularMetrics;

    fn sample(rsrp_dbm: f64, sinr_db: f64) -> MetricSample {
        MetricSample {
            ts: Utc::now(),
            latency_ms: 70.0,
            loss_pct: 0.0,
            jitter_ms: 1.0,
            reachable: true,
            link_up: true,
            class_metrics: ClassMetrics::Cellular(CellularMetrics {
                rsrp_dbm,
                rsrq_db: -10.0,
                sinr_db,
                band: "B3".into(),
                technology: "LTE".into(),
                roaming: false,
                timing_advance: None,
                signal_strength_dbm: rsrp_dbm,
            }),
        }
    }

    #[test]
    fn rsrp_below_floor_signals_degradation() {
        let samples = vec![sample(-115.0, 10.0)];
        let signals = CellularPredictor.evaluate(&samples);
        assert!(signals.iter().any(|s| s.reason == "cellular signal degradation"));
    }

    #[test]
    fn negative_sinr_signals_degradation() {
        let samples = vec![sample(-85.0, -2.0)];
        let signals = CellularPredictor.evaluate(&samples);
        assert!(!signals.is_empty());
    }

    #[test]
    fn healthy_signal_produces_no_signals() {
        let samples: Vec<MetricSample> = (0..6).map(|_| sample(-75.0, 18.0)).collect();
        let signals = CellularPredictor.evaluate(&samples);
        assert!(signals.is_empty());
    }
}
