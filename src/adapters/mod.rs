//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod fallback_data_adapter;
pub mod file_config_adapter;
pub mod memory_repository;
pub mod strategy_dir_adapter;
