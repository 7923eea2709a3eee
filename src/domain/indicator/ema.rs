//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seeded with the first defined input, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k).
//! Outputs before the first defined input are NaN; a NaN input after the
//! seed carries the previous average forward.

pub fn ewm_mean(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if span == 0 {
        return out;
    }

    let k = 2.0 / (span as f64 + 1.0);
    let mut ema: Option<f64> = None;

    for (i, &x) in values.iter().enumerate() {
        ema = match ema {
            None if x.is_nan() => None,
            None => Some(x),
            Some(prev) if x.is_nan() => Some(prev),
            Some(prev) => Some(x * k + prev * (1.0 - k)),
        };
        if let Some(v) = ema {
            out[i] = v;
        }
    }

    out
}
