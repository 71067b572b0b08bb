//! State of one approve/modify/regenerate loop.
//!
//! A session lives for the duration of a single user turn's refinement and is
//! discarded on approval, rejection, or exit. It owns the ordered set of
//! every candidate tried this turn; the regenerate path feeds the whole set
//! back to the generator so no rejected query is repeated.

use crate::refinement::QueryProcessor;
use crate::sql;
use anyhow::Result;
use tracing::debug;

/// User decision at the refinement prompt. Anything unrecognized is a
/// re-prompt, not an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Modify,
    Regenerate,
}

impl Decision {
    /// Only the full words are accepted; abbreviations re-prompt rather than
    /// risking an accidental approval or cancellation.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "yes" => Some(Self::Approve),
            "no" => Some(Self::Reject),
            "modify" => Some(Self::Modify),
            "regenerate" => Some(Self::Regenerate),
            _ => None,
        }
    }
}

pub struct RefinementSession {
    original_query: String,
    current_sql: String,
    /// Normalized SQL of every candidate tried this turn, insertion order.
    tried: Vec<String>,
    iterations: usize,
    max_iterations: usize,
    rejected_render_limit: usize,
}

impl RefinementSession {
    /// Seed the session with the initial candidate from the pipeline.
    pub fn new(original_query: &str, initial_sql: &str, processor: &QueryProcessor) -> Self {
        let normalized = sql::clean_sql(initial_sql);
        Self {
            original_query: original_query.to_string(),
            current_sql: normalized.clone(),
            tried: vec![normalized],
            iterations: 0,
            max_iterations: processor.max_refinement_iterations(),
            rejected_render_limit: processor.rejected_render_limit(),
        }
    }

    pub fn current_sql(&self) -> &str {
        &self.current_sql
    }

    pub fn tried_count(&self) -> usize {
        self.tried.len()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn at_iteration_cap(&self) -> bool {
        self.iterations >= self.max_iterations
    }

    /// Render the tried set for injection into a regenerate prompt. Bounded
    /// to the most recent candidates so prompt size stays sane on long
    /// sessions; the in-memory set itself is never truncated.
    pub fn previous_failures(&self) -> String {
        let start = self.tried.len().saturating_sub(self.rejected_render_limit);
        self.tried[start..]
            .iter()
            .enumerate()
            // Absolute numbering, so a truncated window keeps the same labels
            // the model saw in earlier prompts.
            .map(|(i, q)| format!("Failed Query {}: {}", start + i + 1, q))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Apply a user-requested modification: keep the core logic of the
    /// current SQL, apply only the delta. Context is re-retrieved for the
    /// *original* query so the schema stays anchored to the original intent.
    pub async fn modify(
        &mut self,
        processor: &mut QueryProcessor,
        modification: &str,
    ) -> Result<String> {
        let context = processor.retrieve_relevant_context(&self.original_query).await?;

        let composite = format!(
            "Original request: {}\n\n\
             Current SQL that needs modification:\n{}\n\n\
             MODIFICATION NEEDED: {}\n\n\
             Modify the above SQL query to incorporate the requested change. \
             Keep the core logic the same and apply only the modification.",
            self.original_query, self.current_sql, modification
        );
        let rephrased = processor.rephrase_query(&composite, &context).await?;

        let task_context = format!(
            "TASK: MODIFY existing SQL query\n\
             Original SQL: {}\n\
             Modification requested: {}\n\n\
             {}\n\n\
             Instructions: Take the existing SQL and apply ONLY the requested \
             modification. Do not completely rewrite the query.",
            self.current_sql, modification, context
        );
        let new_sql = processor
            .generate_sql(
                &rephrased.rephrased_query,
                &task_context,
                &format!("MODIFY: {}", modification),
                "",
            )
            .await?;

        processor.record_attempt(
            &self.original_query,
            &new_sql,
            &format!("User requested modification: {}", modification),
        );
        self.accept_candidate(new_sql.clone());
        Ok(new_sql)
    }

    /// Regenerate from scratch, avoiding the failed approach. The full
    /// accumulated tried set is passed to the generator — this is the key
    /// difference from `modify`, which only discourages repetition through
    /// the uniqueness instruction.
    pub async fn regenerate(
        &mut self,
        processor: &mut QueryProcessor,
        reason: &str,
    ) -> Result<String> {
        let context = processor.retrieve_relevant_context(&self.original_query).await?;

        let composite = format!(
            "Original request: {}\n\n\
             FAILED APPROACH that should be AVOIDED:\n{}\n\n\
             PROBLEM WITH FAILED APPROACH: {}\n\n\
             Generate a COMPLETELY DIFFERENT SQL approach to solve this \
             request. Do not use the same tables, joins, or logic as the \
             failed approach above.",
            self.original_query, self.current_sql, reason
        );
        let rephrased = processor.rephrase_query(&composite, &context).await?;

        let task_context = format!(
            "TASK: COMPLETELY REGENERATE SQL query\n\
             Failed approach to avoid: {}\n\
             Reason for failure: {}\n\n\
             {}\n\n\
             Instructions: Generate a COMPLETELY DIFFERENT approach. Use \
             different tables, different joins, different logic. Avoid the \
             patterns from the failed query.",
            self.current_sql, reason, context
        );
        let previous_failures = self.previous_failures();
        let new_sql = processor
            .generate_sql(
                &rephrased.rephrased_query,
                &task_context,
                &format!("REGENERATE: {}", reason),
                &previous_failures,
            )
            .await?;

        processor.record_attempt(
            &self.original_query,
            &new_sql,
            &format!("Previous approach failed: {}", reason),
        );
        self.accept_candidate(new_sql.clone());
        Ok(new_sql)
    }

    fn accept_candidate(&mut self, sql_text: String) {
        if !self.tried.contains(&sql_text) {
            self.tried.push(sql_text.clone());
        } else {
            debug!("Generator repeated a rejected candidate");
        }
        self.current_sql = sql_text;
        self.iterations += 1;
    }
}
