//! Turns raw search hits into a bounded, deduplicated schema context.

use crate::config::Config;
use crate::learning;
use crate::metadata::MetadataStore;
use crate::search::{SearchHit, SemanticSearch};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ContextBuilder {
    search: Arc<dyn SemanticSearch>,
    metadata_file: PathBuf,
    learnings_file: PathBuf,
    top_column_hits: usize,
    top_tables: usize,
    max_learnings: usize,
}

impl ContextBuilder {
    pub fn new(search: Arc<dyn SemanticSearch>, config: &Config) -> Self {
        Self {
            search,
            metadata_file: PathBuf::from(&config.metadata_file),
            learnings_file: PathBuf::from(&config.learnings_file),
            top_column_hits: config.top_column_hits,
            top_tables: config.top_tables,
            max_learnings: config.max_learnings,
        }
    }

    /// Assemble the schema context for one user turn.
    ///
    /// Oversamples column-level hits, aggregates them per table keeping the
    /// maximum relevance, and renders the top tables with their **complete**
    /// column list from the catalog — the generator needs the whole schema of
    /// a table to construct correct joins, not just the matched slice.
    /// Returns an empty string when search finds nothing; callers treat that
    /// as a hard stop.
    pub async fn retrieve_context(&self, query: &str) -> Result<String> {
        let hits = self.search.search(query, self.top_column_hits).await?;
        if hits.is_empty() {
            debug!("Search returned no hits for: {}", query);
            return Ok(String::new());
        }

        let ranked = rank_tables(&hits);
        let top_tables: Vec<&str> = ranked
            .iter()
            .take(self.top_tables)
            .map(|(table, _)| table.as_str())
            .collect();

        // The catalog is reloaded per retrieval; it is the enrichment stage's
        // output and may have been regenerated since the last turn.
        let store = MetadataStore::load(&self.metadata_file)?;

        let mut context = format!(
            "Available Database Schema (Top {} most relevant tables):\n\n",
            top_tables.len()
        );

        let mut rendered_tables = 0usize;
        for table_name in &top_tables {
            let columns = store.columns_for(table_name);
            if columns.is_empty() {
                warn!("Table '{}' returned by search is not in the catalog", table_name);
                continue;
            }
            rendered_tables += 1;

            context.push_str(&format!("Table: {}\n", table_name));
            context.push_str(&format!(
                "Description: {}\n",
                store.table_description(table_name).unwrap_or_default()
            ));
            context.push_str("Columns:\n");
            for column in columns {
                context.push_str(&format!(
                    "  - {} ({}): {}\n",
                    column.column_name, column.data_type, column.column_description
                ));
            }
            context.push('\n');
        }

        // A header with no tables under it is no context at all; the empty
        // string triggers the caller's no-context stop.
        if rendered_tables == 0 {
            warn!("None of the ranked tables exist in the catalog");
            return Ok(String::new());
        }

        let learnings = self.relevant_learnings(query).await;
        if !learnings.is_empty() {
            context.push_str("\n--- Previous Successful Query Patterns ---\n");
            context.push_str(&learnings.join("\n"));
            context.push_str("\n--- End Query Patterns ---\n\n");
        }

        Ok(context)
    }

    /// Learning snippets for the current query: the learnings index first,
    /// falling back to a keyword scan of the on-disk log when the index is
    /// empty or unavailable.
    async fn relevant_learnings(&self, query: &str) -> Vec<String> {
        match self.search.search_learnings(query, self.max_learnings).await {
            Ok(hits) if !hits.is_empty() => hits
                .into_iter()
                .filter(|hit| !hit.query_pattern.is_empty() && !hit.learning.is_empty())
                .map(|hit| format!("Similar query '{}': {}", hit.query_pattern, hit.learning))
                .collect(),
            Ok(_) => {
                learning::keyword_match_log(&self.learnings_file, query, self.max_learnings)
            }
            Err(e) => {
                debug!("Learnings search failed, falling back to log scan: {}", e);
                learning::keyword_match_log(&self.learnings_file, query, self.max_learnings)
            }
        }
    }
}

/// Aggregate column hits per table, keeping the maximum relevance of any
/// matched column, and rank tables by it. The sort is stable, so tables with
/// equal relevance keep first-seen order.
pub fn rank_tables(hits: &[SearchHit]) -> Vec<(String, f64)> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<&str, f64> = HashMap::new();

    for hit in hits {
        match best.get_mut(hit.table_name.as_str()) {
            Some(relevance) => {
                if hit.relevance > *relevance {
                    *relevance = hit.relevance;
                }
            }
            None => {
                order.push(hit.table_name.clone());
                best.insert(hit.table_name.as_str(), hit.relevance);
            }
        }
    }

    let mut ranked: Vec<(String, f64)> = order
        .iter()
        .map(|table| (table.clone(), best[table.as_str()]))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::metadata::{test_record, MetadataRecord};
    use crate::search::LearningHit;
    use async_trait::async_trait;
    use std::io::Write;

    struct FakeSearch {
        hits: Vec<SearchHit>,
        learnings: Vec<LearningHit>,
    }

    #[async_trait]
    impl SemanticSearch for FakeSearch {
        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<SearchHit>> {
            Ok(self.hits.clone())
        }

        async fn search_learnings(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<LearningHit>> {
            Ok(self.learnings.clone())
        }
    }

    fn hit(table: &str, column: &str, relevance: f64) -> SearchHit {
        SearchHit {
            relevance,
            table_name: table.to_string(),
            column_name: column.to_string(),
        }
    }

    fn write_catalog(records: &[MetadataRecord]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for record in records {
            writeln!(file, "{}", serde_json::to_string(record).unwrap()).unwrap();
        }
        file
    }

    fn builder_with(
        hits: Vec<SearchHit>,
        learnings: Vec<LearningHit>,
        catalog: &tempfile::NamedTempFile,
    ) -> ContextBuilder {
        let mut cfg = config::test_config();
        cfg.metadata_file = catalog.path().to_string_lossy().into_owned();
        cfg.learnings_file = "/nonexistent/learnings.md".to_string();
        ContextBuilder::new(Arc::new(FakeSearch { hits, learnings }), &cfg)
    }

    #[test]
    fn test_rank_tables_keeps_max_not_average() {
        let ranked = rank_tables(&[
            hit("orders", "id", 0.3),
            hit("customers", "name", 0.8),
            hit("orders", "total", 0.9),
        ]);
        assert_eq!(ranked[0], ("orders".to_string(), 0.9));
        assert_eq!(ranked[1], ("customers".to_string(), 0.8));
    }

    #[test]
    fn test_rank_tables_ties_keep_first_seen_order() {
        let ranked = rank_tables(&[
            hit("b_table", "x", 0.5),
            hit("a_table", "y", 0.5),
            hit("c_table", "z", 0.5),
        ]);
        let names: Vec<&str> = ranked.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(names, vec!["b_table", "a_table", "c_table"]);
    }

    #[tokio::test]
    async fn test_context_lists_all_columns_of_ranked_tables() {
        let catalog = write_catalog(&[
            test_record("orders", "id", "UInt64"),
            test_record("orders", "total", "Float64"),
            test_record("customers", "id", "UInt64"),
            test_record("customers", "name", "String"),
        ]);
        // Search only matched one column per table; the context must still
        // carry both columns of each.
        let builder = builder_with(
            vec![hit("orders", "total", 0.9), hit("customers", "name", 0.8)],
            vec![],
            &catalog,
        );

        let context = builder.retrieve_context("revenue by customer").await.unwrap();

        let orders_pos = context.find("Table: orders").unwrap();
        let customers_pos = context.find("Table: customers").unwrap();
        assert!(orders_pos < customers_pos);
        assert!(context.contains("- id (UInt64): id of orders"));
        assert!(context.contains("- total (Float64): total of orders"));
        assert!(context.contains("- name (String): name of customers"));
        assert!(context.contains("Description: orders table"));
    }

    #[tokio::test]
    async fn test_empty_search_yields_empty_context() {
        let catalog = write_catalog(&[test_record("orders", "id", "UInt64")]);
        let builder = builder_with(vec![], vec![], &catalog);
        let context = builder.retrieve_context("nothing matches").await.unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_learnings_appended_under_delimited_heading() {
        let catalog = write_catalog(&[test_record("orders", "id", "UInt64")]);
        let builder = builder_with(
            vec![hit("orders", "id", 0.7)],
            vec![LearningHit {
                query_pattern: "top products".to_string(),
                learning: "Uses LIMIT for top N queries".to_string(),
                sql_solution: String::new(),
                tables_involved: String::new(),
            }],
            &catalog,
        );

        let context = builder.retrieve_context("top sellers").await.unwrap();
        assert!(context.contains("--- Previous Successful Query Patterns ---"));
        assert!(context.contains("Similar query 'top products': Uses LIMIT for top N queries"));
    }

    #[tokio::test]
    async fn test_tables_missing_from_catalog_are_skipped() {
        let catalog = write_catalog(&[test_record("orders", "id", "UInt64")]);
        let builder = builder_with(
            vec![hit("ghost", "x", 0.99), hit("orders", "id", 0.5)],
            vec![],
            &catalog,
        );

        let context = builder.retrieve_context("anything").await.unwrap();
        assert!(!context.contains("Table: ghost"));
        assert!(context.contains("Table: orders"));
    }

    #[tokio::test]
    async fn test_all_tables_missing_from_catalog_is_a_hard_stop() {
        let catalog = write_catalog(&[test_record("orders", "id", "UInt64")]);
        let builder = builder_with(
            vec![hit("ghost", "x", 0.99), hit("phantom", "y", 0.5)],
            vec![],
            &catalog,
        );

        // No schema can be rendered, so generation must not proceed on a
        // bare header.
        let context = builder.retrieve_context("anything").await.unwrap();
        assert!(context.is_empty());
    }
}
