//! End-to-end engine tests: definitions from records and directories, runs
//! over shared bars, portfolio blending and the validator.

mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use stratforge::adapters::csv_adapter::CsvBarAdapter;
use stratforge::adapters::memory_repository::MemoryRepository;
use stratforge::adapters::strategy_dir_adapter::StrategyDirRepository;
use stratforge::domain::backtest::Engine;
use stratforge::domain::error::{EngineError, ErrorKind, ExpressionError};
use stratforge::domain::indicator::IndicatorLibrary;
use stratforge::domain::metrics::Metrics;
use stratforge::domain::params::ParameterSet;
use stratforge::domain::registry;
use stratforge::domain::runner;
use stratforge::domain::series::ReturnSeries;
use stratforge::domain::strategy::PortfolioDefinition;
use stratforge::domain::validator;
use stratforge::ports::data_port::BarSource;
use stratforge::ports::strategy_repository::StrategyRepository;

mod pipeline {
    use super::*;

    #[test]
    fn crossover_strategy_runs_end_to_end() {
        let bars = wave_bars("2023-01-01", 120);
        let def = definition("ma", &ma_crossover_record());
        let result = runner::run(&def, &bars, bars.first_date(), bars.last_date()).unwrap();

        assert_eq!(result.signals.len(), 120);
        assert_eq!(result.returns.values()[0], 0.0);
        assert!(result.columns.contains_key("fast_ma"));
        assert!(result.columns.contains_key("slow_ma"));

        // fast_ma is NaN for its first 4 bars, so no signal fires there
        assert!(result.signals.values()[..4].iter().all(|&s| s == 0));
        assert!(result.signals.values().iter().any(|&s| s == 1));
        assert!(result.signals.values().iter().any(|&s| s == -1));
        assert!(result
            .positions
            .values()
            .iter()
            .all(|&p| p == 0.0 || p == 0.5 || p == -0.5));
    }

    #[test]
    fn macd_outputs_usable_in_signals() {
        let bars = wave_bars("2023-01-01", 150);
        let def = definition("rsi", &rsi_reversion_record());
        let result = runner::run(&def, &bars, bars.first_date(), bars.last_date()).unwrap();

        for name in ["rsi", "macd_line", "macd_signal", "macd_histogram"] {
            assert!(result.columns.contains_key(name), "missing {}", name);
        }
        let line = result.columns["macd_line"].as_numeric().unwrap();
        let signal = result.columns["macd_signal"].as_numeric().unwrap();
        let hist = result.columns["macd_histogram"].as_numeric().unwrap();
        for t in 0..line.len() {
            assert_eq!(hist[t], line[t] - signal[t]);
        }
    }

    #[test]
    fn formula_and_builtin_paths_agree() {
        let bars = wave_bars("2023-01-01", 80);
        let record = json!({
            "name": "parity",
            "parameters": {},
            "indicators": [
                { "name": "via_formula", "formula": "ema(close, 10)", "params": {} },
                { "name": "via_builtin", "builtin": "ema", "params": { "window": 10 } },
            ],
            "signals": { "buy": "via_formula > via_builtin", "sell": "via_formula < via_builtin" },
            "position_sizing": { "type": "fixed", "value": 1.0 },
        });
        let result = runner::run(
            &definition("parity", &record),
            &bars,
            bars.first_date(),
            bars.last_date(),
        )
        .unwrap();

        assert_eq!(result.columns["via_formula"], result.columns["via_builtin"]);
        assert!(result.signals.values().iter().all(|&s| s == 0));

        let direct = IndicatorLibrary::default()
            .compute("ema", bars.bars(), &ParameterSet::new().with("window", 10))
            .unwrap();
        assert_eq!(
            result.columns["via_builtin"].as_numeric().unwrap(),
            direct[0].values.as_slice()
        );
    }

    #[test]
    fn runs_are_bit_identical() {
        let bars = wave_bars("2023-01-01", 150);
        let defs = vec![
            definition("ma", &ma_crossover_record()),
            definition("rsi", &rsi_reversion_record()),
        ];
        let engine = Engine::new();
        let first = engine
            .backtest(&bars, &defs, None, bars.first_date(), bars.last_date())
            .unwrap();
        let second = engine
            .backtest(&bars, &defs, None, bars.first_date(), bars.last_date())
            .unwrap();

        for id in ["ma", "rsi"] {
            let a = &first.strategies[id];
            let b = &second.strategies[id];
            assert_eq!(a.signals, b.signals);
            assert_eq!(a.positions, b.positions);
            let bits = |r: &ReturnSeries| r.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(&a.returns), bits(&b.returns));
        }
    }

    #[test]
    fn sell_wins_when_both_sides_fire() {
        let bars = bars_from_closes("2024-01-01", &[10.0, 11.0, 12.0]);
        let def = definition("tie", &strategy_record("tie", "close > 0", "close > 0", 0.3));
        let result = runner::run(&def, &bars, bars.first_date(), bars.last_date()).unwrap();
        assert_eq!(result.signals.values(), &[-1, -1, -1]);
        assert_eq!(result.positions.values(), &[-0.3, -0.3, -0.3]);
    }

    #[test]
    fn date_range_slices_inclusively() {
        let bars = bars_from_closes("2024-01-01", &[10.0, 11.0, 12.0, 13.0, 14.0]);
        let def = definition("all", &strategy_record("all", "true", "false", 1.0));
        let result = runner::run(&def, &bars, date("2024-01-02"), date("2024-01-04")).unwrap();

        assert_eq!(result.returns.dates(), &[date("2024-01-02"), date("2024-01-03"), date("2024-01-04")]);
        assert_eq!(result.returns.values()[0], 0.0);
        assert_relative_eq!(result.returns.values()[1], 12.0 / 11.0 - 1.0, epsilon = 1e-15);
    }
}

mod look_ahead {
    use super::*;

    fn volume_strategy() -> serde_json::Value {
        strategy_record("volume", "volume > 1500", "volume < 500", 1.0)
    }

    fn with_volume(bars: &BarSeries, t: usize, volume: i64) -> BarSeries {
        let mut raw = bars.bars().to_vec();
        raw[t].volume = volume;
        BarSeries::new(raw).unwrap()
    }

    #[test]
    fn perturbing_signal_leaves_same_day_return() {
        let base = wave_bars("2024-01-01", 30);
        let def = definition("volume", &volume_strategy());
        let t = 12;

        let before = runner::run(&def, &base, base.first_date(), base.last_date()).unwrap();
        let perturbed_bars = with_volume(&base, t, 5000);
        let after =
            runner::run(&def, &perturbed_bars, base.first_date(), base.last_date()).unwrap();

        assert_eq!(before.signals.values()[t], 0);
        assert_eq!(after.signals.values()[t], 1);
        assert_eq!(before.returns.values()[..=t], after.returns.values()[..=t]);
        assert_ne!(before.returns.values()[t + 1], after.returns.values()[t + 1]);
    }

    proptest! {
        #[test]
        fn returns_never_use_same_day_position(
            closes in proptest::collection::vec(1.0f64..500.0, 2..60),
            flip in 0usize..60,
        ) {
            let bars = bars_from_closes("2024-01-01", &closes);
            let t = flip % closes.len();
            let def = definition("volume", &volume_strategy());

            let before = runner::run(&def, &bars, bars.first_date(), bars.last_date()).unwrap();
            let perturbed = with_volume(&bars, t, 9000);
            let after = runner::run(&def, &perturbed, bars.first_date(), bars.last_date()).unwrap();

            prop_assert_eq!(before.returns.values()[0], 0.0);
            prop_assert_eq!(&before.returns.values()[..=t], &after.returns.values()[..=t]);
            prop_assert!(after.signals.values().iter().all(|s| [-1, 0, 1].contains(s)));
        }
    }
}

mod portfolio {
    use super::*;

    #[test]
    fn blended_return_matches_weighted_sum() {
        // long A earns +1% on the second bar, short B loses 1%
        let bars = bars_from_closes("2024-03-01", &[100.0, 101.0]);
        let defs = vec![
            definition("A", &strategy_record("A", "true", "false", 1.0)),
            definition("B", &strategy_record("B", "false", "true", 1.0)),
        ];
        let report = Engine::new()
            .backtest(&bars, &defs, None, bars.first_date(), bars.last_date())
            .unwrap();
        assert_relative_eq!(report.strategies["A"].returns.values()[1], 0.01, epsilon = 1e-12);
        assert_relative_eq!(report.strategies["B"].returns.values()[1], -0.01, epsilon = 1e-12);

        let mut returns = BTreeMap::new();
        returns.insert(
            "A".to_string(),
            ReturnSeries::new(vec![date("2024-03-02")], vec![0.01]),
        );
        returns.insert(
            "B".to_string(),
            ReturnSeries::new(vec![date("2024-03-02")], vec![-0.02]),
        );
        let weights = PortfolioDefinition::new().with("A", 0.6).with("B", 0.4);
        let blended = stratforge::domain::portfolio::aggregate(&returns, &weights.weights());
        assert_relative_eq!(blended.values()[0], -0.002, epsilon = 1e-12);
    }

    #[test]
    fn engine_blends_successful_strategies() {
        let bars = wave_bars("2023-01-01", 120);
        let defs = vec![
            definition("ma", &ma_crossover_record()),
            definition("rsi", &rsi_reversion_record()),
        ];
        let weights = PortfolioDefinition::new().with("ma", 0.6).with("rsi", 0.4);
        weights.check_weights().unwrap();

        let report = Engine::new()
            .with_workers(2)
            .unwrap()
            .backtest(&bars, &defs, Some(&weights), bars.first_date(), bars.last_date())
            .unwrap();
        let blended = report.portfolio.unwrap();
        assert_eq!(blended.len(), 120);

        let ma = report.strategies["ma"].returns.values();
        let rsi = report.strategies["rsi"].returns.values();
        for (t, r) in blended.values().iter().enumerate() {
            assert_relative_eq!(*r, 0.6 * ma[t] + 0.4 * rsi[t], epsilon = 1e-15);
        }
    }

    #[test]
    fn expression_failure_is_isolated() {
        let bars = wave_bars("2023-01-01", 60);
        let defs = vec![
            definition("good", &strategy_record("good", "close > open", "close < open", 0.5)),
            definition("unknown_fn", &strategy_record("bad", "exec(close) > 1", "false", 0.5)),
            definition("unbound", &strategy_record("bad", "vwap > close", "false", 0.5)),
        ];
        let weights = PortfolioDefinition::new()
            .with("good", 0.5)
            .with("unknown_fn", 0.25)
            .with("unbound", 0.25);

        let report = Engine::new()
            .backtest(&bars, &defs, Some(&weights), bars.first_date(), bars.last_date())
            .unwrap();

        assert_eq!(report.strategies.len(), 1);
        assert!(matches!(
            &report.failures["unknown_fn"],
            EngineError::Evaluation { source: ExpressionError::Disallowed { .. }, .. }
        ));
        assert!(matches!(
            &report.failures["unbound"],
            EngineError::Evaluation { source: ExpressionError::Unbound { name }, .. } if name == "vwap"
        ));
        assert_eq!(report.failures["unbound"].kind(), ErrorKind::Expression);
        assert!(report.portfolio.is_some());
    }

    #[test]
    fn weights_off_by_more_than_tolerance_are_reported() {
        let weights = PortfolioDefinition::new().with("a", 0.6).with("b", 0.3);
        let err = weights.check_weights().unwrap_err();
        assert_eq!(err.field, "portfolio.weights");
        assert!(PortfolioDefinition::new()
            .with("a", 0.6)
            .with("b", 0.4 + 5e-7)
            .check_weights()
            .is_ok());
    }
}

mod errors {
    use super::*;

    #[test]
    fn range_outside_series_is_hard_failure() {
        let bars = bars_from_closes("2024-01-01", &[10.0, 11.0]);
        let defs = vec![definition("a", &strategy_record("a", "true", "false", 1.0))];
        let err = Engine::new()
            .backtest(&bars, &defs, None, date("2025-01-01"), date("2025-12-31"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);

        let err = runner::run(&defs[0], &bars, date("2024-01-02"), date("2024-01-01")).unwrap_err();
        assert!(matches!(err, EngineError::Range { .. }));
    }

    #[test]
    fn malformed_bars_are_data_errors() {
        let d = date("2024-01-01");
        let err = BarSeries::new(vec![make_bar(d, 10.0), make_bar(d, 11.0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert_eq!(BarSeries::new(vec![]).unwrap_err().kind(), ErrorKind::Data);
    }

    #[test]
    fn non_positive_window_is_expression_error() {
        let bars = wave_bars("2024-01-01", 20);
        let def = definition(
            "w",
            &strategy_record("w", "rolling_mean(close, 0) > 1", "false", 1.0),
        );
        let err = runner::run(&def, &bars, bars.first_date(), bars.last_date()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation { source: ExpressionError::InvalidWindow { .. }, .. }
        ));
    }

    #[test]
    fn numeric_signal_is_type_mismatch() {
        let bars = wave_bars("2024-01-01", 20);
        let def = definition("n", &strategy_record("n", "close + 1", "false", 1.0));
        let err = runner::run(&def, &bars, bars.first_date(), bars.last_date()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation { source: ExpressionError::TypeMismatch { .. }, ref target, .. }
                if target == "signals.buy"
        ));
    }
}

mod validation {
    use super::*;

    #[test]
    fn fixed_value_above_one_is_rejected() {
        let mut record = ma_crossover_record();
        record["position_sizing"]["value"] = json!(1.5);
        let (ok, message) = registry::validate(&record);
        assert!(!ok);
        assert!(message.contains("position_sizing.value"), "{}", message);
    }

    #[test]
    fn missing_position_sizing_names_the_field() {
        let mut record = ma_crossover_record();
        record.as_object_mut().unwrap().remove("position_sizing");
        let (ok, message) = registry::validate(&record);
        assert!(!ok);
        assert!(message.contains("position_sizing"), "{}", message);
    }

    #[test]
    fn validator_reports_metrics_for_valid_definition() {
        let bars = validator::canonical_bars().unwrap();
        let report = validator::validate_record(
            &IndicatorLibrary::default(),
            "rsi",
            &rsi_reversion_record(),
            &bars,
        );
        assert!(report.ok, "{}", report.message);
        let m = report.metrics.unwrap();
        assert!(m.max_drawdown <= 0.0);
        assert_eq!(m.trade_frequency, m.buy_count + m.sell_count);
        assert!(m.position_stats.max <= 0.25 && m.position_stats.min >= -0.25);
    }

    #[test]
    fn metrics_match_run_result() {
        let bars = wave_bars("2023-01-01", 252);
        let def = definition("ma", &ma_crossover_record());
        let result = runner::run(&def, &bars, bars.first_date(), bars.last_date()).unwrap();
        let m = Metrics::compute(&result);

        let total: f64 = result.returns.values().iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
        assert_relative_eq!(m.total_return, total, epsilon = 1e-12);
        assert_relative_eq!(m.annualized_return, total, epsilon = 1e-12);
    }
}

mod repositories {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn later_directory_overrides_earlier() {
        let base = TempDir::new().unwrap();
        let overrides = TempDir::new().unwrap();
        write_file(
            base.path(),
            "ma.json",
            &serde_json::to_string(&ma_crossover_record()).unwrap(),
        );
        write_file(
            base.path(),
            "rsi.json",
            &serde_json::to_string(&rsi_reversion_record()).unwrap(),
        );
        let mut tuned = ma_crossover_record();
        tuned["name"] = json!("MA crossover (tuned)");
        write_file(overrides.path(), "ma.json", &serde_json::to_string(&tuned).unwrap());

        let a = StrategyDirRepository::new(base.path().to_path_buf());
        let b = StrategyDirRepository::new(overrides.path().to_path_buf());
        let report = registry::load(&[&a, &b]).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.definitions.len(), 2);
        assert_eq!(report.definitions["ma"].name, "MA crossover (tuned)");
    }

    #[test]
    fn invalid_file_definition_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut bad = ma_crossover_record();
        bad["signals"] = json!({ "buy": { "expr": "close > 1" }, "sell": "false" });
        write_file(dir.path(), "bad.json", &serde_json::to_string(&bad).unwrap());
        write_file(
            dir.path(),
            "good.json",
            &serde_json::to_string(&ma_crossover_record()).unwrap(),
        );

        let repo = StrategyDirRepository::new(dir.path().to_path_buf());
        let report = registry::load(&[&repo]).unwrap();
        assert!(report.definitions.contains_key("good"));
        assert_eq!(report.rejected["bad"].field, "signals.buy");
    }

    #[test]
    fn memory_and_directory_sources_merge() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "ma.json",
            &serde_json::to_string(&ma_crossover_record()).unwrap(),
        );
        let files = StrategyDirRepository::new(dir.path().to_path_buf());
        let mut memory = MemoryRepository::new("session");
        memory
            .save("scratch", &strategy_record("scratch", "true", "false", 0.1))
            .unwrap();

        let report = registry::load(&[&files, &memory]).unwrap();
        let ids: Vec<&String> = report.definitions.keys().collect();
        assert_eq!(ids, vec!["ma", "scratch"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let repo = StrategyDirRepository::new("/nonexistent/strategies".into());
        let err = registry::load(&[&repo]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Source);
    }

    #[test]
    fn csv_bars_feed_the_engine() {
        let dir = TempDir::new().unwrap();
        let bars = wave_bars("2023-01-01", 90);
        write_bars_csv(dir.path(), "DEMO", &bars);

        let source = CsvBarAdapter::new(dir.path().to_path_buf());
        let loaded = source
            .fetch_bars("DEMO", date("2023-01-01"), date("2023-12-31"))
            .unwrap();
        assert_eq!(loaded, bars);

        let defs = vec![definition("ma", &ma_crossover_record())];
        let report = Engine::new()
            .backtest(&loaded, &defs, None, date("2023-02-01"), date("2023-03-01"))
            .unwrap();
        assert_eq!(report.strategies["ma"].returns.len(), 29);
    }
}
