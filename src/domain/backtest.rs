//! Backtest entry point.
//!
//! Runs every strategy against one shared, read-only bar series, in parallel
//! over a rayon pool, then blends the successful runs into a portfolio.
//! Expression failures are isolated per strategy; range and data problems
//! fail the whole call up front.

use crate::domain::bar::BarSeries;
use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorLibrary;
use crate::domain::portfolio;
use crate::domain::runner::{self, RunResult};
use crate::domain::series::ReturnSeries;
use crate::domain::strategy::{PortfolioDefinition, StrategyDefinition};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug)]
pub struct BacktestReport {
    pub strategies: BTreeMap<String, RunResult>,
    pub failures: BTreeMap<String, EngineError>,
    pub portfolio: Option<ReturnSeries>,
}

#[derive(Debug, Default)]
pub struct Engine {
    library: IndicatorLibrary,
    pool: Option<rayon::ThreadPool>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, library: IndicatorLibrary) -> Self {
        self.library = library;
        self
    }

    /// Use a dedicated pool of `workers` threads instead of rayon's global pool.
    pub fn with_workers(mut self, workers: usize) -> Result<Self, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| EngineError::ConfigInvalid {
                section: "backtest".into(),
                key: "workers".into(),
                reason: e.to_string(),
            })?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn backtest(
        &self,
        bars: &BarSeries,
        definitions: &[StrategyDefinition],
        portfolio: Option<&PortfolioDefinition>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BacktestReport, EngineError> {
        let slice = bars.slice(start_date, end_date)?;
        info!(
            strategies = definitions.len(),
            bars = slice.len(),
            start = %start_date,
            end = %end_date,
            "Starting backtest"
        );

        let run_all = || -> Vec<(String, Result<RunResult, EngineError>)> {
            definitions
                .par_iter()
                .map(|def| (def.id.clone(), runner::run_slice(&self.library, def, slice)))
                .collect()
        };
        let outcomes = match &self.pool {
            Some(pool) => pool.install(run_all),
            None => run_all(),
        };

        let mut strategies = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    strategies.insert(id, result);
                }
                Err(e) => {
                    warn!(strategy = %id, error = %e, "Strategy run failed; excluded from portfolio");
                    failures.insert(id, e);
                }
            }
        }

        let portfolio = portfolio.map(|p| {
            let returns: BTreeMap<String, ReturnSeries> = strategies
                .iter()
                .map(|(id, r)| (id.clone(), r.returns.clone()))
                .collect();
            portfolio::aggregate(&returns, &p.weights())
        });

        info!(
            succeeded = strategies.len(),
            failed = failures.len(),
            "Backtest complete"
        );
        Ok(BacktestReport {
            strategies,
            failures,
            portfolio,
        })
    }
}
