//! Context assembly for the generation pipeline: schema context retrieved
//! per turn, plus the bounded conversation memory rendered as text.

pub mod context_builder;
pub mod conversation;

pub use context_builder::ContextBuilder;
pub use conversation::{ConversationMemory, ConversationTurn};
