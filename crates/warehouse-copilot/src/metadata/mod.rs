//! Read-only access to the enriched column metadata catalog.
//!
//! The catalog is produced by the external extraction/enrichment stage as a
//! JSON Lines file, one column record per line, keyed by
//! `(table_name, column_name)`. The core loads it fully into memory per
//! context-retrieval call and never writes to it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Distinct-value profile of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CardinalityLevel {
    Low,
    High,
    #[default]
    Unknown,
}

/// One column of the warehouse, with the statistics and generated
/// descriptions the context assembler renders into prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    #[serde(default)]
    pub cardinality: u64,
    #[serde(default)]
    pub cardinality_level: CardinalityLevel,
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub sample_values: Vec<String>,
    #[serde(default)]
    pub neighbouring_columns: Vec<String>,
    #[serde(default)]
    pub column_description: String,
    #[serde(default)]
    pub table_description: String,
}

/// In-memory view of the catalog, preserving file order within each table.
pub struct MetadataStore {
    records: Vec<MetadataRecord>,
    by_table: HashMap<String, Vec<usize>>,
}

impl MetadataStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Metadata catalog not found: {}", path.display()))?;

        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: MetadataRecord = serde_json::from_str(&line).with_context(|| {
                format!("Malformed metadata record at {}:{}", path.display(), line_no + 1)
            })?;
            records.push(record);
        }

        debug!("Loaded {} metadata records from {}", records.len(), path.display());
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<MetadataRecord>) -> Self {
        let mut by_table: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            by_table.entry(record.table_name.clone()).or_default().push(idx);
        }
        Self { records, by_table }
    }

    /// All columns of a table, in catalog order. Empty when the table is not
    /// in the catalog.
    pub fn columns_for(&self, table_name: &str) -> Vec<&MetadataRecord> {
        self.by_table
            .get(table_name)
            .map(|indices| indices.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    pub fn table_description(&self, table_name: &str) -> Option<&str> {
        self.by_table
            .get(table_name)
            .and_then(|indices| indices.first())
            .map(|&i| self.records[i].table_description.as_str())
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_record(table: &str, column: &str, data_type: &str) -> MetadataRecord {
    MetadataRecord {
        table_name: table.to_string(),
        column_name: column.to_string(),
        data_type: data_type.to_string(),
        cardinality: 10,
        cardinality_level: CardinalityLevel::Low,
        total_rows: 1000,
        primary_key: false,
        sample_values: vec![],
        neighbouring_columns: vec![],
        column_description: format!("{column} of {table}"),
        table_description: format!("{table} table"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_columns_preserve_catalog_order() {
        let store = MetadataStore::from_records(vec![
            test_record("orders", "id", "UInt64"),
            test_record("orders", "total", "Float64"),
            test_record("customers", "id", "UInt64"),
        ]);

        let columns: Vec<&str> =
            store.columns_for("orders").iter().map(|r| r.column_name.as_str()).collect();
        assert_eq!(columns, vec!["id", "total"]);
        assert!(store.columns_for("missing").is_empty());
    }

    #[test]
    fn test_load_skips_blank_lines_and_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"table_name":"orders","column_name":"id","data_type":"UInt64"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"table_name":"orders","column_name":"total","data_type":"Float64","cardinality":99,"cardinality_level":"High"}}"#
        )
        .unwrap();

        let store = MetadataStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].cardinality_level, CardinalityLevel::Unknown);
        assert_eq!(store.records()[1].cardinality_level, CardinalityLevel::High);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        assert!(MetadataStore::load("/nonexistent/metadata.jsonl").is_err());
    }
}
