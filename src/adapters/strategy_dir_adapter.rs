//! Directory-backed strategy repository.
//!
//! Reads every `*.toml` and `*.json` file in one directory. A file is either a
//! single definition (id = file stem) or a multi-strategy document with a
//! top-level `strategies` table. Saved definitions are written as
//! `<id>.json`.

use crate::domain::error::EngineError;
use crate::domain::schema;
use crate::ports::strategy_repository::StrategyRepository;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    record: Value,
    /// True when the file holds only this definition.
    standalone: bool,
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_document(path: &Path) -> Result<Value, EngineError> {
    let content = fs::read_to_string(path)?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str::<Value>(&content).map_err(|e| e.to_string()),
        _ => serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| EngineError::Source {
        origin: path.display().to_string(),
        reason,
    })
}

/// Read one definition file into `(id, record)` pairs. TOML is chosen by
/// extension, anything else is read as JSON.
pub fn read_definitions(path: &Path) -> Result<Vec<(String, Value)>, EngineError> {
    Ok(schema::split_document(&file_stem(path), read_document(path)?))
}

pub struct StrategyDirRepository {
    dir: PathBuf,
    name: String,
}

impl StrategyDirRepository {
    pub fn new(dir: PathBuf) -> Self {
        let name = dir.display().to_string();
        Self { dir, name }
    }

    fn error(&self, reason: String) -> EngineError {
        EngineError::Source {
            origin: self.name.clone(),
            reason,
        }
    }

    fn definition_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| self.error(format!("failed to read directory: {}", e)))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| self.error(format!("directory entry error: {}", e)))?
                .path();
            let is_definition = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("toml") | Some("json")
            );
            if is_definition && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every record in the directory, keyed by id. Files are read in name
    /// order and a later file wins an id collision.
    fn scan(&self) -> Result<BTreeMap<String, Entry>, EngineError> {
        let mut entries = BTreeMap::new();
        for path in self.definition_files()? {
            let stem = file_stem(&path);
            let records = read_definitions(&path)?;
            let standalone = records.len() == 1 && records[0].0 == stem;
            for (id, record) in records {
                let entry = Entry {
                    path: path.clone(),
                    record,
                    standalone,
                };
                if let Some(previous) = entries.insert(id.clone(), entry) {
                    warn!(
                        strategy = %id,
                        previous = %previous.path.display(),
                        current = %path.display(),
                        "Duplicate strategy id in directory; later file wins"
                    );
                }
            }
        }
        debug!(dir = %self.dir.display(), strategies = entries.len(), "Scanned strategy directory");
        Ok(entries)
    }

    fn check_id(&self, id: &str) -> Result<(), EngineError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(self.error(format!("invalid strategy id '{}'", id)))
        }
    }
}

impl StrategyRepository for StrategyDirRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.scan()?.into_keys().collect())
    }

    fn load(&self, id: &str) -> Result<Value, EngineError> {
        self.scan()?
            .remove(id)
            .map(|entry| entry.record)
            .ok_or_else(|| self.error(format!("no strategy '{}'", id)))
    }

    fn save(&mut self, id: &str, record: &Value) -> Result<(), EngineError> {
        self.check_id(id)?;
        fs::create_dir_all(&self.dir)?;

        let stale = self.dir.join(format!("{}.toml", id));
        if stale.is_file() {
            fs::remove_file(&stale)?;
        }

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| self.error(format!("failed to serialize '{}': {}", id, e)))?;
        fs::write(self.dir.join(format!("{}.json", id)), content)?;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), EngineError> {
        let entry = self
            .scan()?
            .remove(id)
            .ok_or_else(|| self.error(format!("no strategy '{}'", id)))?;
        if !entry.standalone {
            return Err(self.error(format!(
                "strategy '{}' is part of {}; edit that document instead",
                id,
                entry.path.display()
            )));
        }
        fs::remove_file(&entry.path)?;
        Ok(())
    }
}
