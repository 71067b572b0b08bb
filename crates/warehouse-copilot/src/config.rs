// warehouse-copilot/src/config.rs

use crate::error::AssistantError;
use anyhow::Result;
use std::env;
use tracing::{info, warn};

/// Runtime configuration, constructed once at process start and passed by
/// reference to every component that needs it. No module-level globals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the knowledge-base / semantic search service.
    pub kb_service_url: String,
    /// Name of the metadata index; the learnings index is derived from it.
    pub kb_name: String,

    /// Base URL of the completion backend (OpenAI-style chat completions).
    pub completion_url: String,
    pub completion_model: String,
    pub completion_temperature: f32,
    pub completion_max_tokens: u32,

    /// Warehouse HTTP endpoint for query execution.
    pub warehouse_url: String,
    pub warehouse_user: String,
    pub warehouse_password: String,
    pub warehouse_database: String,

    /// Enriched metadata catalog (JSON Lines, one column record per line).
    pub metadata_file: String,
    /// Append-only Markdown log of successful query episodes.
    pub learnings_file: String,

    /// Column-level hits requested from the search service per turn.
    pub top_column_hits: usize,
    /// Tables kept in the assembled schema context.
    pub top_tables: usize,
    /// Learning snippets appended to the schema context.
    pub max_learnings: usize,

    /// Conversation turns retained in memory.
    pub max_history: usize,
    /// Hard cap on modify/regenerate cycles within one turn.
    pub max_refinement_iterations: usize,
    /// Most recent rejected candidates rendered into regenerate prompts.
    pub rejected_render_limit: usize,

    /// Concurrent column-description workers during enrichment.
    pub enrich_workers: usize,
    /// Pause between enrichment submissions, in milliseconds.
    pub enrich_pacing_ms: u64,

    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let kb_service_url = env::var("KB_SERVICE_URL").map_err(|_| {
            AssistantError::Configuration(
                "KB_SERVICE_URL environment variable not set. Please set it in your .env file"
                    .into(),
            )
        })?;
        let completion_url = env::var("COMPLETION_URL").map_err(|_| {
            AssistantError::Configuration(
                "COMPLETION_URL environment variable not set. Please set it in your .env file"
                    .into(),
            )
        })?;
        let warehouse_url = env::var("WAREHOUSE_URL").map_err(|_| {
            AssistantError::Configuration(
                "WAREHOUSE_URL environment variable not set. Please set it in your .env file"
                    .into(),
            )
        })?;

        let warehouse_user = env::var("WAREHOUSE_USER").unwrap_or_else(|_| "default".into());
        let warehouse_password = env::var("WAREHOUSE_PASSWORD").unwrap_or_default();
        let warehouse_database = env::var("WAREHOUSE_DATABASE").unwrap_or_else(|_| "default".into());

        if warehouse_password.is_empty() {
            warn!("WAREHOUSE_PASSWORD not set, connecting without credentials");
        }

        let config = Self {
            kb_service_url,
            kb_name: env::var("KB_NAME").unwrap_or_else(|_| "warehouse_metadata_kb".into()),
            completion_url,
            completion_model: env::var("COMPLETION_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".into()),
            completion_temperature: numeric_var("COMPLETION_TEMPERATURE", "0.1")?,
            completion_max_tokens: numeric_var("COMPLETION_MAX_TOKENS", "12000")?,
            warehouse_url,
            warehouse_user,
            warehouse_password,
            warehouse_database,
            metadata_file: env::var("METADATA_FILE")
                .unwrap_or_else(|_| "outputs/warehouse_metadata.jsonl".into()),
            learnings_file: env::var("LEARNINGS_FILE")
                .unwrap_or_else(|_| "data/successful_queries.md".into()),
            top_column_hits: numeric_var("TOP_COLUMN_HITS", "50")?,
            top_tables: numeric_var("TOP_TABLES", "20")?,
            max_learnings: numeric_var("MAX_LEARNINGS", "3")?,
            max_history: numeric_var("MAX_HISTORY", "5")?,
            max_refinement_iterations: numeric_var("MAX_REFINEMENT_ITERATIONS", "10")?,
            rejected_render_limit: numeric_var("REJECTED_RENDER_LIMIT", "10")?,
            enrich_workers: numeric_var("ENRICH_WORKERS", "3")?,
            enrich_pacing_ms: numeric_var("ENRICH_PACING_MS", "100")?,
            request_timeout_seconds: numeric_var("REQUEST_TIMEOUT_SECONDS", "120")?,
        };

        info!(
            "Configuration: kb={} model={} top_tables={} max_history={}",
            config.kb_name, config.completion_model, config.top_tables, config.max_history
        );

        Ok(config)
    }

    /// Name of the learnings index, derived from the metadata index name.
    pub fn learnings_kb_name(&self) -> String {
        format!("{}_learnings", self.kb_name)
    }
}

/// Optional numeric variable with a default. A set-but-unparseable value is a
/// configuration error naming the variable, not a bare parse error.
fn numeric_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T> {
    let raw = env::var(name).unwrap_or_else(|_| default.into());
    parse_numeric(name, &raw)
}

fn parse_numeric<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        AssistantError::Configuration(format!("{name} must be numeric, got '{raw}'")).into()
    })
}

/// Helper used across unit tests; not part of the public API.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        kb_service_url: "http://127.0.0.1:47334".to_string(),
        kb_name: "warehouse_metadata_kb".to_string(),
        completion_url: "http://127.0.0.1:8081".to_string(),
        completion_model: "gemini-2.5-flash".to_string(),
        completion_temperature: 0.1,
        completion_max_tokens: 12000,
        warehouse_url: "http://127.0.0.1:8123".to_string(),
        warehouse_user: "default".to_string(),
        warehouse_password: String::new(),
        warehouse_database: "default".to_string(),
        metadata_file: "outputs/warehouse_metadata.jsonl".to_string(),
        learnings_file: "data/successful_queries.md".to_string(),
        top_column_hits: 50,
        top_tables: 20,
        max_learnings: 3,
        max_history: 5,
        max_refinement_iterations: 10,
        rejected_render_limit: 10,
        enrich_workers: 3,
        enrich_pacing_ms: 100,
        request_timeout_seconds: 120,
    }
}
