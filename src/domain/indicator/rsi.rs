//! RSI (Relative Strength Index) indicator.
//!
//! Average gain and average loss are trailing simple means of the positive
//! and negative price changes over n bars:
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n outputs are NaN (n price changes are needed).

use crate::domain::indicator::sma::rolling_mean;

pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    if period == 0 || n < 2 {
        return vec![f64::NAN; n];
    }

    let mut gains = vec![f64::NAN; n];
    let mut losses = vec![f64::NAN; n];
    for i in 1..n {
        let change = values[i] - values[i - 1];
        if change.is_nan() {
            continue;
        }
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(&gain, &loss)| {
            if gain.is_nan() || loss.is_nan() {
                f64::NAN
            } else if loss == 0.0 {
                100.0
            } else {
                100.0 - (100.0 / (1.0 + gain / loss))
            }
        })
        .collect()
}
