//! Simple Moving Average / rolling mean.
//!
//! SMA(n)[i] = sum(x[i-n+1..=i]) / n
//! Warmup: first (n-1) outputs are NaN. A window containing NaN yields NaN.

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        out[i] = slice.iter().sum::<f64>() / window as f64;
    }

    out
}
