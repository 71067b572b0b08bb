//! Durable learning records for approved query episodes.
//!
//! Approved queries are appended to a human-readable Markdown log. The log is
//! append-only: entries are never rewritten in place. The learnings index in
//! the search service is refreshed by an explicit full rebuild that reparses
//! the entire log — never by inline per-store upserts.

use crate::sql;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One parsed entry of the learnings log, as mirrored into the learnings
/// index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub id: String,
    pub query_pattern: String,
    pub sql_solution: String,
    pub tables_involved: String,
    pub learning: String,
    pub user_feedback: String,
}

pub struct LearningSink {
    log_path: PathBuf,
}

impl LearningSink {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self { log_path: log_path.into() }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append a structured entry for an approved query episode.
    pub fn store_successful(
        &self,
        user_query: &str,
        sql_query: &str,
        user_feedback: &str,
    ) -> Result<()> {
        let tables = sql::extract_tables(sql_query);
        let insights = extract_insights(user_query, sql_query, user_feedback);

        let mut entry = format!(
            "\n### {}\n**SQL:** `{}`\n**Tables:** {}\n",
            user_query.trim(),
            sql_query.trim(),
            if tables.is_empty() { "N/A".to_string() } else { tables.join(", ") }
        );
        if !user_feedback.is_empty() {
            entry.push_str(&format!("**Learning:** {}\n", user_feedback));
        }
        if !insights.is_empty() {
            entry.push_str(&format!("**Key Insight:** {}\n", insights));
        }
        entry.push_str("\n---\n");

        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Cannot open learnings log {}", self.log_path.display()))?;
        file.write_all(entry.as_bytes())
            .context("Failed to append learning entry")?;

        info!("Stored learning entry for: {}", user_query.trim());
        Ok(())
    }

    /// Reparse the whole log into structured records for an index rebuild.
    /// Missing log means no learnings yet, not an error.
    pub fn parse_log(&self) -> Result<Vec<LearningRecord>> {
        if !self.log_path.exists() {
            debug!("No learnings log at {}", self.log_path.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.log_path)
            .with_context(|| format!("Cannot read {}", self.log_path.display()))?;
        Ok(parse_log_content(&content))
    }
}

/// Parse the Markdown log into records. Each entry begins with a `### `
/// heading holding the query pattern, followed by `**SQL:**`, `**Tables:**`,
/// `**Learning:**`, and `**Key Insight:**` lines.
pub fn parse_log_content(content: &str) -> Vec<LearningRecord> {
    let mut records = Vec::new();

    for (i, entry) in content.split("### ").skip(1).enumerate() {
        let mut lines = entry.trim().lines();
        let query_pattern = match lines.next() {
            Some(title) if !title.trim().is_empty() => title.trim().to_string(),
            _ => continue,
        };

        let mut record = LearningRecord {
            id: format!("learning_{i}"),
            query_pattern,
            sql_solution: String::new(),
            tables_involved: String::new(),
            learning: String::new(),
            user_feedback: String::new(),
        };

        for line in lines {
            if let Some(rest) = line.strip_prefix("**SQL:**") {
                let rest = rest.trim();
                record.sql_solution = rest.trim_matches('`').to_string();
            } else if let Some(rest) = line.strip_prefix("**Tables:**") {
                record.tables_involved = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("**Learning:**") {
                record.learning = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("**Key Insight:**") {
                record.user_feedback = rest.trim().to_string();
            }
        }

        records.push(record);
    }

    records
}

/// Keyword fallback when the learnings index is empty or unreachable: scan
/// the on-disk log for entries whose title shares a word with the query.
pub fn keyword_match_log(log_path: &Path, query: &str, limit: usize) -> Vec<String> {
    let content = match std::fs::read_to_string(log_path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };

    let query_lower = query.to_lowercase();
    let keywords: Vec<&str> = query_lower.split_whitespace().filter(|w| w.len() > 2).collect();

    parse_log_content(&content)
        .into_iter()
        .filter(|record| {
            let title = record.query_pattern.to_lowercase();
            keywords.iter().any(|keyword| title.contains(keyword))
        })
        .filter_map(|record| {
            let insight = if !record.learning.is_empty() {
                record.learning
            } else if !record.user_feedback.is_empty() {
                record.user_feedback
            } else {
                return None;
            };
            Some(format!("Similar query '{}': {}", record.query_pattern, insight))
        })
        .take(limit)
        .collect()
}

/// Lightweight heuristic annotations for a successful episode. Advisory
/// only, not guaranteed accurate.
pub fn extract_insights(user_query: &str, sql_query: &str, user_feedback: &str) -> String {
    let query_lower = user_query.to_lowercase();
    let sql_lower = sql_query.to_lowercase();
    let mut insights = Vec::new();

    if query_lower.contains("top") && sql_lower.contains("limit") {
        insights.push("Uses LIMIT for top N queries");
    }
    if query_lower.contains("revenue") && sql_lower.contains("sum") {
        insights.push("Revenue queries typically use SUM aggregation");
    }
    if sql::extract_tables(sql_query).len() > 1 {
        insights.push("Multi-table joins required for this type of query");
    }

    let feedback_lower = user_feedback.to_lowercase();
    if feedback_lower.contains("join") {
        insights.push("User needed clarification on table relationships");
    }
    if feedback_lower.contains("group") {
        insights.push("Grouping logic was important for this query");
    }

    insights.join("; ")
}
