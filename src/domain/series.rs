//! Date-keyed output series produced by a strategy run, plus the
//! per-bar columns expressions work on.

use chrono::NaiveDate;

/// Values aligned one-to-one with ascending dates.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    dates: Vec<NaiveDate>,
    values: Vec<T>,
}

/// Per-date trade intent: -1 sell, 0 hold, +1 buy.
pub type SignalSeries = TimeSeries<i8>;
/// Per-date signed fractional exposure.
pub type PositionSeries = TimeSeries<f64>;
/// Per-date realized return.
pub type ReturnSeries = TimeSeries<f64>;

impl<T> TimeSeries<T> {
    /// Pair `dates` with `values`; both must have the same length.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<T>) -> Self {
        assert_eq!(
            dates.len(),
            values.len(),
            "time series dates and values must align"
        );
        Self { dates, values }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&T> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &T)> {
        self.dates.iter().copied().zip(self.values.iter())
    }
}

/// A derived column: numeric values or a boolean mask, one entry per bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Boolean(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric series",
            Column::Boolean(_) => "boolean series",
        }
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Column::Numeric(v) => Some(v),
            Column::Boolean(_) => None,
        }
    }

    pub fn as_boolean(&self) -> Option<&[bool]> {
        match self {
            Column::Boolean(v) => Some(v),
            Column::Numeric(_) => None,
        }
    }
}
