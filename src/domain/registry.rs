//! Strategy definition registry.
//!
//! Merges raw records from an ordered list of repositories (later sources
//! override earlier ones by id), then validates every merged record. Invalid
//! definitions are excluded and reported, never dropped silently.

use crate::domain::error::{EngineError, SchemaError};
use crate::domain::schema;
use crate::domain::strategy::StrategyDefinition;
use crate::ports::strategy_repository::StrategyRepository;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct LoadReport {
    pub definitions: BTreeMap<String, StrategyDefinition>,
    pub rejected: BTreeMap<String, SchemaError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Read every record from `sources` in order; later sources win on id collision.
pub fn merge_records(
    sources: &[&dyn StrategyRepository],
) -> Result<BTreeMap<String, Value>, EngineError> {
    let mut merged: BTreeMap<String, (String, Value)> = BTreeMap::new();

    for source in sources {
        let ids = source.list()?;
        debug!(source = source.name(), count = ids.len(), "Reading strategy source");
        for id in ids {
            let record = source.load(&id)?;
            if let Some((previous, _)) = merged.get(&id) {
                warn!(
                    id = %id,
                    previous = %previous,
                    source = source.name(),
                    "Strategy definition overridden by later source"
                );
            }
            merged.insert(id, (source.name().to_string(), record));
        }
    }

    Ok(merged
        .into_iter()
        .map(|(id, (_, record))| (id, record))
        .collect())
}

/// Validate `(id, record)` pairs into a [`LoadReport`].
pub fn from_records(records: impl IntoIterator<Item = (String, Value)>) -> LoadReport {
    let mut report = LoadReport::default();
    for (id, record) in records {
        match schema::parse_definition(&id, &record) {
            Ok(definition) => {
                report.definitions.insert(id, definition);
            }
            Err(e) => {
                warn!(id = %id, field = %e.field, reason = %e.reason, "Strategy definition rejected");
                report.rejected.insert(id, e);
            }
        }
    }
    report
}

/// Load and validate every definition reachable from `sources`.
pub fn load(sources: &[&dyn StrategyRepository]) -> Result<LoadReport, EngineError> {
    let records = merge_records(sources)?;
    let report = from_records(records);
    info!(
        loaded = report.definitions.len(),
        rejected = report.rejected.len(),
        "Strategy registry loaded"
    );
    Ok(report)
}

/// Validate one record, reporting `(ok, message)`.
pub fn validate(record: &Value) -> (bool, String) {
    schema::validate_record(record)
}
