//! Portfolio aggregation.
//!
//! Blends per-strategy return series into one weighted series, merging by
//! date key. A strategy with no return on a date contributes 0 there.

use crate::domain::series::ReturnSeries;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Weighted sum of returns over the union of dates.
///
/// Only strategies named in `weights` contribute; weights naming a strategy
/// without returns contribute nothing. Weights need not sum to 1.
pub fn aggregate(
    returns: &BTreeMap<String, ReturnSeries>,
    weights: &BTreeMap<String, f64>,
) -> ReturnSeries {
    let mut blended: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for (id, weight) in weights {
        let Some(series) = returns.get(id) else {
            debug!(strategy = %id, "No returns for weighted strategy");
            continue;
        };
        for (date, r) in series.iter() {
            *blended.entry(date).or_insert(0.0) += weight * r;
        }
    }

    let (dates, values): (Vec<NaiveDate>, Vec<f64>) = blended.into_iter().unzip();
    ReturnSeries::new(dates, values)
}
