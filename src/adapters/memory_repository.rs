//! In-memory strategy repository.

use crate::domain::error::EngineError;
use crate::ports::strategy_repository::StrategyRepository;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    name: String,
    records: BTreeMap<String, Value>,
}

impl MemoryRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: BTreeMap::new(),
        }
    }

    fn not_found(&self, id: &str) -> EngineError {
        EngineError::Source {
            origin: self.name.clone(),
            reason: format!("no strategy '{}'", id),
        }
    }
}

impl StrategyRepository for MemoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.records.keys().cloned().collect())
    }

    fn load(&self, id: &str) -> Result<Value, EngineError> {
        self.records.get(id).cloned().ok_or_else(|| self.not_found(id))
    }

    fn save(&mut self, id: &str, record: &Value) -> Result<(), EngineError> {
        self.records.insert(id.to_string(), record.clone());
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), EngineError> {
        match self.records.remove(id) {
            Some(_) => Ok(()),
            None => Err(self.not_found(id)),
        }
    }
}
