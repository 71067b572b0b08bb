use thiserror::Error;

/// Failure categories surfaced by the assistant core.
///
/// Most call sites propagate `anyhow::Error` with context attached; these
/// typed variants mark the seams where the failing subsystem matters to the
/// caller (startup validation and the three remote backends).
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Missing or malformed connection/credential parameters. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The search service rejected a request.
    #[error("search service error: {0}")]
    Search(String),

    /// The completion backend rejected a request or returned unusable output.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The warehouse rejected a query. Recovered as an empty result set.
    #[error("query execution failed: {0}")]
    Execution(String),
}
