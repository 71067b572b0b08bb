pub mod completion;
pub mod config;
pub mod context_engine;
pub mod enrichment;
pub mod error;
pub mod executor;
pub mod learning;
pub mod metadata;
pub mod refinement;
pub mod repl;
pub mod search;
pub mod sql;
pub mod telemetry;

// Public API exports
pub use config::Config;
pub use context_engine::{ContextBuilder, ConversationMemory, ConversationTurn};
pub use error::AssistantError;
pub use executor::{QueryExecutor, WarehouseClient};
pub use learning::{LearningRecord, LearningSink};
pub use metadata::{MetadataRecord, MetadataStore};
pub use refinement::{Decision, ProcessOutcome, QueryProcessor, RefinementSession};
pub use repl::InteractiveSession;
pub use search::{KnowledgeBaseClient, SearchHit, SemanticSearch};
