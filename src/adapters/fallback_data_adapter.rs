//! Ordered fallback over several bar sources.

use crate::domain::bar::BarSeries;
use crate::domain::error::EngineError;
use crate::ports::data_port::BarSource;
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Tries each provider in order; the first to return bars wins.
pub struct FallbackBarSource {
    providers: Vec<Box<dyn BarSource + Send + Sync>>,
}

impl FallbackBarSource {
    pub fn new(providers: Vec<Box<dyn BarSource + Send + Sync>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl BarSource for FallbackBarSource {
    fn name(&self) -> &str {
        "fallback"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BarSeries, EngineError> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.fetch_bars(symbol, start_date, end_date) {
                Ok(bars) => {
                    debug!(symbol, provider = provider.name(), bars = bars.len(), "Bars fetched");
                    return Ok(bars);
                }
                Err(e) => {
                    warn!(symbol, provider = provider.name(), error = %e, "Bar source failed; trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EngineError::Source {
            origin: self.name().to_string(),
            reason: "no bar sources configured".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        label: String,
        calls: Arc<AtomicUsize>,
    }

    impl BarSource for Failing {
        fn name(&self) -> &str {
            &self.label
        }

        fn fetch_bars(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<BarSeries, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Source {
                origin: self.label.clone(),
                reason: "unavailable".into(),
            })
        }
    }

    struct Fixed(f64);

    impl BarSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_bars(&self, _: &str, start: NaiveDate, _: NaiveDate) -> Result<BarSeries, EngineError> {
            BarSeries::new(vec![Bar {
                date: start,
                open: self.0,
                high: self.0,
                low: self.0,
                close: self.0,
                volume: 1,
            }])
        }
    }

    fn failing(label: &str, calls: &Arc<AtomicUsize>) -> Box<dyn BarSource + Send + Sync> {
        Box::new(Failing {
            label: label.into(),
            calls: Arc::clone(calls),
        })
    }

    fn d() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn first_success_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FallbackBarSource::new(vec![
            failing("primary", &calls),
            Box::new(Fixed(10.0)),
            Box::new(Fixed(20.0)),
        ]);
        let bars = source.fetch_bars("DEMO", d(), d()).unwrap();
        assert_eq!(bars.bars()[0].close, 10.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn all_failing_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FallbackBarSource::new(vec![failing("a", &calls), failing("b", &calls)]);
        let err = source.fetch_bars("DEMO", d(), d()).unwrap_err();
        assert!(matches!(err, EngineError::Source { ref origin, .. } if origin == "b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_providers_is_source_error() {
        let source = FallbackBarSource::new(vec![]);
        assert!(source.is_empty());
        assert!(matches!(
            source.fetch_bars("DEMO", d(), d()),
            Err(EngineError::Source { .. })
        ));
    }
}
