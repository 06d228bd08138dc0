use netwan_types::models::{ClassMetrics, MetricSample};

use super::regression::{fit, window};
use super::{PredictorSignal, Predictor, MIN_R2};

/// Owns obstruction %, SNR dB, and latency ms for Starlink members.
pub struct StarlinkPredictor;

fn starlink_series(samples: &[MetricSample]) -> Vec<(f64, f64)> {
    samples
        .iter()
        .filter_map(|s| match &s.class_metrics {
            ClassMetrics::Starlink(m) => Some((m.obstruction_pct, m.snr_db as f64)),
            _ => None,
        })
        .collect()
}

impl Predictor for StarlinkPredictor {
    fn evaluate(&self, samples: &[MetricSample]) -> Vec<PredictorSignal> {
        let mut signals = Vec::new();

        if let Some(last) = samples.last() {
            if let ClassMetrics::Starlink(m) = &last.class_metrics {
                if m.thermal_shutdown {
                    signals.push(PredictorSignal::failover("thermal"));
                }
                if m.swupdate_reboot_ready {
                    signals.push(PredictorSignal::failover("reboot imminent"));
                }
            }
        }

        let series = starlink_series(samples);
        let obstruction: Vec<f64> = window(&series.iter().map(|(o, _)| *o).collect::<Vec<_>>()).to_vec();
        let snr: Vec<f64> = window(&series.iter().map(|(_, s)| *s).collect::<Vec<_>>()).to_vec();

        if let Some(reg) = fit(&obstruction) {
            if reg.r2 >= MIN_R2 && (reg.slope > 5.0 || reg.prediction > 10.0) {
                signals.push(PredictorSignal::failover("obstruction acceleration"));
            }
        }

        if let Some(reg) = fit(&snr) {
            if reg.r2 >= MIN_R2 && (reg.slope < -2.0 || reg.prediction < 5.0) {
                signals.push(PredictorSignal::failover("SNR degradation"));
            }
        }

        signals
    }
}
