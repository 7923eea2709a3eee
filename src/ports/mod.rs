//! Port traits for the engine's external collaborators.

pub mod config_port;
pub mod data_port;
pub mod strategy_repository;
