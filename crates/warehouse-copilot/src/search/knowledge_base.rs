//! HTTP client for the knowledge-base service hosting both indexes.

use super::{LearningHit, SearchHit, SemanticSearch};
use crate::config::Config;
use crate::error::AssistantError;
use crate::learning::LearningRecord;
use crate::metadata::MetadataStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

pub struct KnowledgeBaseClient {
    base_url: String,
    kb_name: String,
    learnings_kb_name: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct FindRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct FindResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

impl KnowledgeBaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.kb_service_url.trim_end_matches('/').to_string(),
            kb_name: config.kb_name.clone(),
            learnings_kb_name: config.learnings_kb_name(),
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
                .build()
                .unwrap_or_default(),
        }
    }

    fn kb_url(&self, kb: &str, op: &str) -> String {
        format!("{}/knowledge_bases/{}/{}", self.base_url, kb, op)
    }

    async fn find<T: serde::de::DeserializeOwned>(
        &self,
        kb: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<T>> {
        let response = self
            .http_client
            .post(self.kb_url(kb, "find"))
            .json(&FindRequest { query, limit: top_k })
            .send()
            .await
            .with_context(|| format!("Search request to '{}' failed", kb))?;

        if !response.status().is_success() {
            return Err(AssistantError::Search(format!(
                "search on '{}' returned HTTP {}",
                kb,
                response.status()
            ))
            .into());
        }

        let body: FindResponse<T> =
            response.json().await.context("Malformed search response")?;
        Ok(body.results)
    }

    /// Drop and recreate the metadata index from the catalog. Embedding every
    /// column description is the service's job; we only ship the records.
    pub async fn create_knowledge_base(&self, store: &MetadataStore) -> Result<()> {
        info!(
            "Creating knowledge base '{}' with {} column records",
            self.kb_name,
            store.len()
        );

        self.drop_index(&self.kb_name).await;

        let payload = json!({
            "name": self.kb_name,
            "id_column": "column_name",
            "content_columns": ["column_description"],
            "metadata_columns": [
                "table_name", "data_type", "cardinality", "cardinality_level",
                "total_rows", "primary_key", "sample_values",
                "neighbouring_columns", "table_description",
            ],
            "records": store.records(),
        });

        let response = self
            .http_client
            .post(format!("{}/knowledge_bases", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Knowledge base creation request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Knowledge base creation returned HTTP {}", response.status());
        }

        info!("Knowledge base '{}' created and populated", self.kb_name);
        Ok(())
    }

    /// Full rebuild of the learnings index from parsed log records. Idempotent:
    /// the previous index is dropped and repopulated from scratch, never
    /// upserted.
    pub async fn rebuild_learnings(&self, records: &[LearningRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No learning records found, skipping learnings index rebuild");
            return Ok(());
        }

        info!(
            "Rebuilding learnings index '{}' with {} records",
            self.learnings_kb_name,
            records.len()
        );

        self.drop_index(&self.learnings_kb_name).await;

        let payload = json!({
            "name": self.learnings_kb_name,
            "id_column": "id",
            "content_columns": ["query_pattern", "sql_solution", "learning"],
            "metadata_columns": ["tables_involved", "user_feedback"],
            "records": records,
        });

        let response = self
            .http_client
            .post(format!("{}/knowledge_bases", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Learnings index creation request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Learnings index creation returned HTTP {}", response.status());
        }

        info!("Learnings index '{}' rebuilt", self.learnings_kb_name);
        Ok(())
    }

    async fn drop_index(&self, kb: &str) {
        // Missing index is the common case on first run.
        match self
            .http_client
            .delete(format!("{}/knowledge_bases/{}", self.base_url, kb))
            .send()
            .await
        {
            Ok(response) if !response.status().is_success() => {
                debug!("Drop of '{}' returned HTTP {}", kb, response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("Drop of '{}' failed: {}", kb, e),
        }
    }
}

#[async_trait]
impl SemanticSearch for KnowledgeBaseClient {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        debug!("Searching metadata index for: {}", query);
        self.find(&self.kb_name, query, top_k).await
    }

    async fn search_learnings(&self, query: &str, top_k: usize) -> Result<Vec<LearningHit>> {
        // The learnings index may not exist yet; treat any failure as empty.
        match self.find(&self.learnings_kb_name, query, top_k).await {
            Ok(hits) => Ok(hits),
            Err(e) => {
                debug!("Learnings search unavailable: {}", e);
                Ok(Vec::new())
            }
        }
    }
}
