//! Least-squares linear regression over a bounded trailing window, used by
//! every class predictor in this module to turn a series of samples into a
//! slope, a goodness-of-fit, and a one-step-ahead prediction.

/// Regression over `y = slope * x + intercept` where `x` is the sample
/// index (0-based) within the window passed in.
#[derive(Debug, Clone, Copy)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r2: f64,
    /// Value predicted one step past the last sample in the window.
    pub prediction: f64,
}

/// Fits a line through `values` (oldest first). Returns `None` for fewer
/// than two points or a degenerate (zero-variance-in-x) window, which
/// cannot happen in practice since `x` is always `0..n`, so this really
/// only guards the `n < 2` case.
pub fn fit(values: &[f64]) -> Option<Regression> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mean_x = (n as f64 - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }
    let r2 = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };
    let prediction = slope * n as f64 + intercept;

    Some(Regression {
        slope,
        intercept,
        r2,
        prediction,
    })
}

/// Minimum window over which a predictor will trust a regression fit,
/// per §4.6's "last ≤20 samples".
pub const MAX_WINDOW: usize = 20;

/// Takes the tail of `values` bounded by [`MAX_WINDOW`].
pub fn window(values: &[f64]) -> &[f64] {
    let start = values.len().saturating_sub(MAX_WINDOW);
    &values[start..]
}
