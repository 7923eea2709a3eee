//! Strategy definition storage port.
//!
//! Records are the raw, unvalidated documents; validation is the registry's job.

use crate::domain::error::EngineError;
use serde_json::Value;

pub trait StrategyRepository {
    /// Label used in logs when records from several repositories are merged.
    fn name(&self) -> &str;

    /// Ids of every stored definition, sorted.
    fn list(&self) -> Result<Vec<String>, EngineError>;

    fn load(&self, id: &str) -> Result<Value, EngineError>;

    fn save(&mut self, id: &str, record: &Value) -> Result<(), EngineError>;

    fn delete(&mut self, id: &str) -> Result<(), EngineError>;
}
