//! CSV file bar adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with a
//! `date,open,high,low,close,volume` header.

use crate::domain::bar::{Bar, BarSeries};
use crate::domain::error::EngineError;
use crate::ports::data_port::{BarSource, BarStore};
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvBarAdapter {
    base_path: PathBuf,
    name: String,
}

impl CsvBarAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        let name = format!("csv:{}", base_path.display());
        Self { base_path, name }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn source_error(&self, reason: String) -> EngineError {
        EngineError::Source {
            origin: self.name.clone(),
            reason,
        }
    }

    /// Available symbols, one per `.csv` file, sorted.
    pub fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            self.source_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.source_error(format!("directory entry error: {}", e)))?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

fn column<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    line: u64,
) -> Result<T, EngineError>
where
    T::Err: std::fmt::Display,
{
    let name = HEADER[index];
    let raw = record.get(index).ok_or_else(|| EngineError::Data {
        reason: format!("line {}: missing {} column", line, name),
    })?;
    raw.trim().parse().map_err(|e| EngineError::Data {
        reason: format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
    })
}

impl BarSource for CsvBarAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BarSeries, EngineError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)
            .map_err(|e| self.source_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| EngineError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let date_str = record.get(0).ok_or_else(|| EngineError::Data {
                reason: format!("line {}: missing date column", line),
            })?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|e| {
                EngineError::Data {
                    reason: format!("line {}: invalid date format: {}", line, e),
                }
            })?;

            if date < start_date || date > end_date {
                continue;
            }

            bars.push(Bar {
                date,
                open: column(&record, 1, line)?,
                high: column(&record, 2, line)?,
                low: column(&record, 3, line)?,
                close: column(&record, 4, line)?,
                volume: column(&record, 5, line)?,
            });
        }

        bars.sort_by_key(|b| b.date);
        debug!(symbol, bars = bars.len(), path = %path.display(), "Loaded CSV bars");
        BarSeries::new(bars)
    }
}

impl BarStore for CsvBarAdapter {
    fn save_bars(&self, symbol: &str, bars: &BarSeries) -> Result<(), EngineError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.csv_path(symbol);
        let mut wtr = csv::Writer::from_path(&path)
            .map_err(|e| self.source_error(format!("failed to create {}: {}", path.display(), e)))?;

        let write_err = |e: csv::Error| self.source_error(format!("failed to write {}: {}", path.display(), e));
        wtr.write_record(HEADER).map_err(write_err)?;
        for bar in bars.bars() {
            wtr.write_record(&[
                bar.date.format("%Y-%m-%d").to_string(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(write_err)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
