//! Market data collaborator ports.
//!
//! Retrieval and persistence of bars live outside the engine; the engine only
//! consumes a validated [`BarSeries`].

use crate::domain::bar::BarSeries;
use crate::domain::error::EngineError;
use chrono::NaiveDate;

pub trait BarSource {
    /// Short label used in logs and error origins.
    fn name(&self) -> &str;

    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BarSeries, EngineError>;
}

pub trait BarStore {
    fn save_bars(&self, symbol: &str, bars: &BarSeries) -> Result<(), EngineError>;
}
