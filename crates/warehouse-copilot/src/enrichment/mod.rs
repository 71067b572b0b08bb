//! AI enrichment of the raw metadata catalog.
//!
//! Fills in `column_description` and `table_description` for every record via
//! the completion backend. Column jobs fan out through a fixed-size worker
//! pool with paced submission; a failed item gets a sentinel description
//! rather than aborting the batch.

use crate::completion::{CompletionBackend, Prompt};
use crate::metadata::MetadataRecord;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

/// Stand-in description for items whose generation call failed.
pub const FAILED_DESCRIPTION: &str = "Description generation failed";

const MAX_DESCRIPTION_CHARS: usize = 1000;

pub struct MetadataEnricher {
    backend: Arc<dyn CompletionBackend>,
    max_workers: usize,
    pacing: Duration,
}

impl MetadataEnricher {
    pub fn new(backend: Arc<dyn CompletionBackend>, max_workers: usize, pacing_ms: u64) -> Self {
        Self { backend, max_workers, pacing: Duration::from_millis(pacing_ms) }
    }

    /// Enrich the whole catalog, table by table. Input order is preserved in
    /// the output even though column jobs complete in no particular order.
    pub async fn enrich(&self, records: Vec<MetadataRecord>) -> Vec<MetadataRecord> {
        let mut table_order: Vec<String> = Vec::new();
        for record in &records {
            if !table_order.contains(&record.table_name) {
                table_order.push(record.table_name.clone());
            }
        }
        info!(
            "Enriching {} columns across {} tables",
            records.len(),
            table_order.len()
        );

        let mut enriched = records;
        for (table_idx, table_name) in table_order.iter().enumerate() {
            info!(
                "Processing table {}/{}: {}",
                table_idx + 1,
                table_order.len(),
                table_name
            );

            let columns: Vec<MetadataRecord> = enriched
                .iter()
                .filter(|r| &r.table_name == table_name)
                .cloned()
                .collect();

            let table_description = self.describe_table(table_name, &columns).await;
            let column_descriptions = self.describe_columns(&columns).await;

            let mut column_iter = column_descriptions.into_iter();
            for record in enriched.iter_mut().filter(|r| &r.table_name == table_name) {
                record.column_description =
                    column_iter.next().unwrap_or_else(|| FAILED_DESCRIPTION.to_string());
                record.table_description = table_description.clone();
            }
        }

        enriched
    }

    /// Generate descriptions for one table's columns through the worker pool.
    /// Results come back positionally, regardless of completion order.
    async fn describe_columns(&self, columns: &[MetadataRecord]) -> Vec<String> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(columns.len());

        for column in columns {
            let permit_source = semaphore.clone();
            let backend = self.backend.clone();
            let prompt = column_prompt(column);
            let column_name = column.column_name.clone();

            handles.push(tokio::spawn(async move {
                // The semaphore is never closed, so acquisition cannot fail.
                let _permit = permit_source.acquire_owned().await.ok();
                match backend.complete(prompt).await {
                    Ok(description) => truncate(&description),
                    Err(e) => {
                        error!("Failed to describe column {}: {}", column_name, e);
                        FAILED_DESCRIPTION.to_string()
                    }
                }
            }));

            // Pace submissions to respect backend rate limits.
            sleep(self.pacing).await;
        }

        let mut descriptions = Vec::with_capacity(handles.len());
        for handle in handles {
            descriptions.push(handle.await.unwrap_or_else(|e| {
                error!("Column description task panicked: {}", e);
                FAILED_DESCRIPTION.to_string()
            }));
        }
        debug!("Described {} columns", descriptions.len());
        descriptions
    }

    async fn describe_table(&self, table_name: &str, columns: &[MetadataRecord]) -> String {
        let prompt = table_prompt(table_name, columns);
        match self.backend.complete(prompt).await {
            Ok(description) => truncate(&description),
            Err(e) => {
                error!("Failed to describe table {}: {}", table_name, e);
                FAILED_DESCRIPTION.to_string()
            }
        }
    }
}

fn truncate(description: &str) -> String {
    let trimmed = description.trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_CHARS {
        let cut: String = trimmed.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

fn column_prompt(column: &MetadataRecord) -> Prompt {
    let system = "\
Generate a concise column description without filler words. Rules:
- No filler phrases like \"This column contains\"
- For datetime columns: state the format, e.g. YYYY-MM-DD HH:MM:SS
- For ID columns: state the cardinality and whether it is likely a primary \
key, plus any value pattern
- Be direct and factual, under 1000 characters"
        .to_string();

    let user = format!(
        "Table: {}\nColumn: {}\nData type: {}\nCardinality: {} ({:?})\n\
         Total rows: {}\nPrimary key: {}\nSample values: {}\nNeighbouring columns: {}",
        column.table_name,
        column.column_name,
        column.data_type,
        column.cardinality,
        column.cardinality_level,
        column.total_rows,
        column.primary_key,
        column.sample_values.join(", "),
        column.neighbouring_columns.join(", "),
    );

    Prompt { system, user }
}

fn table_prompt(table_name: &str, columns: &[MetadataRecord]) -> Prompt {
    let system = "\
Generate a concise table description without filler words. Rules:
- No filler phrases like \"This table contains\"
- Be direct about what the table represents
- Focus on business purpose, under 50 words"
        .to_string();

    let mut summary = vec!["Key Columns:".to_string()];
    for column in columns.iter().take(8) {
        summary.push(format!("- {} ({})", column.column_name, column.data_type));
    }
    summary.push("\nColumn Relationships:".to_string());
    for column in columns.iter().take(5) {
        if !column.neighbouring_columns.is_empty() {
            summary.push(format!(
                "- {} neighbors: {}",
                column.column_name,
                column.neighbouring_columns.join(", ")
            ));
        }
    }

    let total_rows = columns.first().map(|c| c.total_rows).unwrap_or(0);
    let user = format!(
        "Table: {}\nTotal rows: {}\n{}",
        table_name,
        total_rows,
        summary.join("\n")
    );

    Prompt { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionBackend;
    use crate::metadata::test_record;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that fails on one specific column and tracks peak concurrency.
    struct TrackingBackend {
        fail_on: String,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for TrackingBackend {
        async fn complete(&self, prompt: Prompt) -> anyhow::Result<String> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if prompt.user.contains(&self.fail_on) {
                anyhow::bail!("simulated backend failure");
            }
            Ok(format!("description for request of {} chars", prompt.user.len()))
        }
    }

    #[tokio::test]
    async fn test_enrich_fills_descriptions_and_replaces_failures() {
        let backend = Arc::new(TrackingBackend {
            fail_on: "Column: total".to_string(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let enricher = MetadataEnricher::new(backend.clone(), 3, 0);

        let mut records = vec![
            test_record("orders", "id", "UInt64"),
            test_record("orders", "total", "Float64"),
            test_record("customers", "name", "String"),
        ];
        for record in &mut records {
            record.column_description.clear();
            record.table_description.clear();
        }

        let enriched = enricher.enrich(records).await;

        assert_eq!(enriched.len(), 3);
        assert!(enriched[0].column_description.starts_with("description"));
        assert_eq!(enriched[1].column_description, FAILED_DESCRIPTION);
        assert!(enriched[2].column_description.starts_with("description"));
        assert!(!enriched[0].table_description.is_empty());
        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let backend = Arc::new(TrackingBackend {
            fail_on: "never-matches".to_string(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let enricher = MetadataEnricher::new(backend.clone(), 2, 0);

        let records: Vec<_> =
            (0..12).map(|n| test_record("events", &format!("col_{n}"), "String")).collect();
        enricher.enrich(records).await;

        // One table-description call runs alone first; the column fan-out is
        // capped by the pool size.
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_truncate_caps_length_with_ellipsis() {
        let long = "x".repeat(2000);
        let truncated = truncate(&long);
        assert_eq!(truncated.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }
}
