//! Rolling standard deviation.
//!
//! Sample standard deviation (n-1 denominator) over the trailing n values.
//! Warmup: first (n-1) outputs are NaN; a window of 1 is always NaN.

pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window < 2 || values.len() < window {
        return out;
    }

    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let variance = slice
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / (window - 1) as f64;
        out[i] = variance.sqrt();
    }

    out
}
