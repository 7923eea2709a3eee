//! Daily OHLCV bars and the immutable bar series.

use crate::domain::error::EngineError;
use chrono::NaiveDate;

/// Columns every bar frame exposes to expressions.
pub const BAR_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Value of a bar column by name, `None` for anything outside [`BAR_COLUMNS`].
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume as f64),
            _ => None,
        }
    }
}

/// Date-ordered bars with unique, strictly increasing dates.
///
/// Construction validates the series once; afterwards it is shared read-only
/// by every strategy run of a backtest.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self, EngineError> {
        if bars.is_empty() {
            return Err(EngineError::Data {
                reason: "bar series is empty".to_string(),
            });
        }

        for (i, bar) in bars.iter().enumerate() {
            if i > 0 && bar.date <= bars[i - 1].date {
                return Err(EngineError::Data {
                    reason: format!(
                        "dates must be strictly increasing: {} follows {}",
                        bar.date,
                        bars[i - 1].date
                    ),
                });
            }
            let prices = [bar.open, bar.high, bar.low, bar.close];
            if prices.iter().any(|p| !p.is_finite()) {
                return Err(EngineError::Data {
                    reason: format!("non-finite price on {}", bar.date),
                });
            }
            if bar.close <= 0.0 {
                return Err(EngineError::Data {
                    reason: format!("close must be positive on {}, got {}", bar.date, bar.close),
                });
            }
        }

        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.bars[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].date
    }

    /// Bars with `start <= date <= end`.
    ///
    /// An inverted range or a range that selects no bars is a hard failure.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Result<&[Bar], EngineError> {
        if end < start {
            return Err(EngineError::Range {
                reason: format!("end date {} precedes start date {}", end, start),
            });
        }
        let from = self.bars.partition_point(|b| b.date < start);
        let to = self.bars.partition_point(|b| b.date <= end);
        if from >= to {
            return Err(EngineError::Range {
                reason: format!(
                    "no bars between {} and {} (series covers {} to {})",
                    start,
                    end,
                    self.first_date(),
                    self.last_date()
                ),
            });
        }
        Ok(&self.bars[from..to])
    }
}
