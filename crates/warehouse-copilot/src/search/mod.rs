//! Semantic search over the metadata and learnings indexes.
//!
//! The embedding/vector backend is external; the core talks to it through
//! [`SemanticSearch`] and treats empty results as a normal outcome, never an
//! error.

mod knowledge_base;

pub use knowledge_base::KnowledgeBaseClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One column-level hit from the metadata index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub relevance: f64,
    pub table_name: String,
    pub column_name: String,
}

/// One hit from the learnings index of past successful query patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningHit {
    #[serde(default)]
    pub query_pattern: String,
    #[serde(default)]
    pub learning: String,
    #[serde(default)]
    pub sql_solution: String,
    #[serde(default)]
    pub tables_involved: String,
}

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Rank columns of the metadata index against a text query.
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;

    /// Rank past query patterns from the learnings index. Implementations
    /// return an empty list when the index does not exist yet.
    async fn search_learnings(&self, query: &str, top_k: usize)
        -> anyhow::Result<Vec<LearningHit>>;
}
