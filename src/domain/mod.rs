//! Core engine types and logic.

pub mod bar;
pub mod params;
pub mod series;
pub mod expr;
pub mod expr_parser;
pub mod expr_eval;
pub mod indicator;
pub mod strategy;
pub mod schema;
pub mod registry;
pub mod runner;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod validator;
pub mod config_validation;
pub mod error;
