use netwan_types::models::{ClassMetrics, MetricSample};

use super::regression::{fit, window};
use super::{PredictorSignal, Predictor, MIN_R2};

/// Owns signal dBm, noise dBm, and quality % for Wi-Fi members.
pub struct WifiPredictor;

struct WifiSeries {
    signal: Vec<f64>,
    noise: Vec<f64>,
    quality: Vec<f64>,
}

fn wifi_series(samples: &[MetricSample]) -> WifiSeries {
    let mut signal = Vec::new();
    let mut noise = Vec::new();
    let mut quality = Vec::new();
    for s in samples {
        if let ClassMetrics::Wifi(m) = &s.class_metrics {
            signal.push(m.signal_strength_dbm);
            noise.push(m.noise_level_dbm);
            quality.push(m.quality_pct);
        }
    }
    WifiSeries { signal, noise, quality }
}

impl Predictor for WifiPredictor {
    fn evaluate(&self, samples: &[MetricSample]) -> Vec<PredictorSignal> {
        let mut signals = Vec::new();
        let series = wifi_series(samples);

        let signal_window = window(&series.signal);
        if let Some(reg) = fit(signal_window) {
            if reg.r2 >= MIN_R2 && (reg.slope < -3.0 || reg.prediction < -80.0) {
                signals.push(PredictorSignal::failover("signal degradation"));
            }
        }

        let current_quality = series.quality.last().copied().unwrap_or(100.0);
        let quality_window = window(&series.quality);
        let quality_trend_bad = fit(quality_window)
            .map(|reg| reg.r2 >= MIN_R2 && reg.slope < -5.0)
            .unwrap_or(false);
        if quality_trend_bad || current_quality < 30.0 {
            signals.push(PredictorSignal::failover("quality degradation"));
        }

        let noise_window = window(&series.noise);
        let noise_rising = fit(noise_window)
            .map(|reg| reg.r2 >= MIN_R2 && reg.slope > 2.0)
            .unwrap_or(false);
        let last_signal = series.signal.last().copied().unwrap_or(0.0);
        let last_noise = series.noise.last().copied().unwrap_or(-95.0);
        let snr = last_signal - last_noise;
        if noise_rising || snr < 20.0 {
            // Advisory only: interference alone does not trigger a failover.
            signals.push(PredictorSignal::advisory("interference risk"));
        }

        signals
    }
}
