//! stratforge: declarative strategy backtesting engine.
//!
//! Strategies are data: indicator formulas and buy/sell conditions written in a
//! small expression language, evaluated column-wise over daily bars.
//!
//! Hexagonal architecture: engine logic in [`domain`], collaborator traits in
//! [`ports`], concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
