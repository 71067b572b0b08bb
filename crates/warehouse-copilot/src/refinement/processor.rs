//! Per-turn generation pipeline: context retrieval, rephrasing, SQL
//! generation, safety classification, and conversation-history injection.

use crate::completion::{
    CompletionBackend, GenerateRequest, RephraseAnalysis, RephraseRequest, SafetyRequest,
    SafetyVerdict,
};
use crate::config::Config;
use crate::context_engine::{ContextBuilder, ConversationMemory, ConversationTurn};
use crate::learning::LearningSink;
use crate::sql;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one `process_query` turn. `sql_query` is `None` when the turn
/// short-circuited (no relevant context); `reason` is always populated.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub rephrased_query: String,
    pub sql_query: Option<String>,
    pub reason: String,
}

pub struct QueryProcessor {
    context_builder: ContextBuilder,
    backend: Arc<dyn CompletionBackend>,
    sink: LearningSink,
    memory: ConversationMemory,
    max_refinement_iterations: usize,
    rejected_render_limit: usize,
}

impl QueryProcessor {
    pub fn new(
        context_builder: ContextBuilder,
        backend: Arc<dyn CompletionBackend>,
        sink: LearningSink,
        config: &Config,
    ) -> Self {
        Self {
            context_builder,
            backend,
            sink,
            memory: ConversationMemory::new(config.max_history),
            max_refinement_iterations: config.max_refinement_iterations,
            rejected_render_limit: config.rejected_render_limit,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn clear_history(&mut self) {
        self.memory.clear();
    }

    pub fn max_refinement_iterations(&self) -> usize {
        self.max_refinement_iterations
    }

    pub fn rejected_render_limit(&self) -> usize {
        self.rejected_render_limit
    }

    /// Schema context for a query, anchored to the raw user phrasing.
    pub async fn retrieve_relevant_context(&self, query: &str) -> Result<String> {
        self.context_builder.retrieve_context(query).await
    }

    /// Restate the user's question as an unambiguous, schema-grounded SQL
    /// problem. Conversation history is prepended here; the rephraser itself
    /// never sees the memory buffer.
    pub async fn rephrase_query(
        &self,
        user_query: &str,
        context: &str,
    ) -> Result<RephraseAnalysis> {
        let request = RephraseRequest {
            user_query: user_query.to_string(),
            context: self.with_history(context),
        };
        let reply = self.backend.complete(request.render()).await?;
        let analysis = RephraseRequest::parse(&reply);
        debug!(
            "Rephrased ({} intent): {}",
            analysis.query_intent, analysis.rephrased_query
        );
        Ok(analysis)
    }

    /// Generate a candidate query, normalized to canonical SQL text. Serves
    /// both initial generation (empty feedback/rejects) and the refinement
    /// modes.
    pub async fn generate_sql(
        &self,
        rephrased_query: &str,
        context: &str,
        user_feedback: &str,
        previous_queries: &str,
    ) -> Result<String> {
        let request = GenerateRequest {
            rephrased_query: rephrased_query.to_string(),
            context: self.with_history(context),
            user_feedback: user_feedback.to_string(),
            previous_queries: previous_queries.to_string(),
        };
        let reply = self.backend.complete(request.render()).await?;
        Ok(sql::clean_sql(&reply))
    }

    /// Advisory safety classification; the user decides whether to execute.
    pub async fn check_sql_safety(&self, sql_query: &str) -> Result<SafetyVerdict> {
        let request = SafetyRequest { sql_query: sql_query.to_string() };
        let reply = self.backend.complete(request.render()).await?;
        Ok(SafetyRequest::parse(&reply))
    }

    /// One full turn: retrieve context, rephrase, generate. No context means
    /// a hard stop — the generator is never invoked.
    pub async fn process_query(&self, user_query: &str) -> Result<ProcessOutcome> {
        let context = self.retrieve_relevant_context(user_query).await?;
        if context.is_empty() {
            info!("No relevant context for query, skipping generation");
            return Ok(ProcessOutcome {
                rephrased_query: user_query.to_string(),
                sql_query: None,
                reason: "No relevant database context found".to_string(),
            });
        }

        let analysis = self.rephrase_query(user_query, &context).await?;
        let sql_query =
            self.generate_sql(&analysis.rephrased_query, &context, "", "").await?;

        Ok(ProcessOutcome {
            rephrased_query: analysis.rephrased_query,
            sql_query: Some(sql_query),
            reason: "Query generated successfully".to_string(),
        })
    }

    /// Persist an approved episode and remember the turn as successful.
    pub fn store_successful_query(
        &mut self,
        user_query: &str,
        sql_query: &str,
        user_feedback: &str,
    ) -> Result<()> {
        self.sink.store_successful(user_query, sql_query, user_feedback)?;
        self.memory
            .record(ConversationTurn::new(user_query, sql_query, user_feedback, true));
        Ok(())
    }

    /// Remember a rejected or revised candidate, feedback retained.
    pub fn record_attempt(&mut self, user_query: &str, sql_query: &str, feedback: &str) {
        self.memory
            .record(ConversationTurn::new(user_query, sql_query, feedback, false));
    }

    fn with_history(&self, context: &str) -> String {
        let history = self.memory.render();
        if history.is_empty() {
            context.to_string()
        } else {
            format!("{history}{context}")
        }
    }
}
