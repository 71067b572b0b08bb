//! Typed request structs for each completion operation.
//!
//! Every operation the backend performs has an explicit request type with
//! named fields and a fixed prompt rendering. Keeping these structured (rather
//! than ad hoc string maps) pins down exactly what context each stage sees.

use super::Prompt;
use serde::Deserialize;
use serde_json::Value;

/// Rephrase-and-classify: turn ambiguous natural language into an unambiguous,
/// schema-grounded SQL problem statement.
#[derive(Debug, Clone)]
pub struct RephraseRequest {
    pub user_query: String,
    /// Schema context, with conversation history already prepended by the
    /// caller. The rephraser itself is unaware of the memory buffer.
    pub context: String,
}

/// Structured output of the rephrase operation. Only `rephrased_query` flows
/// forward in the pipeline; the rest is kept for diagnostics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RephraseAnalysis {
    #[serde(default)]
    pub query_intent: String,
    #[serde(default)]
    pub data_entities: String,
    #[serde(default)]
    pub time_dimension: String,
    #[serde(default)]
    pub aggregation_type: String,
    #[serde(default)]
    pub filters_conditions: String,
    #[serde(default)]
    pub complexity_level: String,
    pub rephrased_query: String,
}

impl RephraseRequest {
    pub fn render(&self) -> Prompt {
        let system = "\
You analyze questions about an analytical SQL warehouse and restate them as \
complete, unambiguous SQL problem statements.

Respond with a single JSON object containing exactly these fields:
- query_intent: analytical, operational, exploratory, or diagnostic
- data_entities: tables, columns, or metrics mentioned or implied
- time_dimension: time range or aggregation period, empty if none
- aggregation_type: required aggregations (count, sum, avg, percentiles, ...)
- filters_conditions: filtering or WHERE clause requirements
- complexity_level: simple, moderate, or complex
- rephrased_query: the complete, unambiguous SQL problem statement

The rephrased_query MUST use actual table and column names from the supplied \
schema context. Never invent names that are not in the context."
            .to_string();

        let user = format!(
            "Schema context:\n{}\n\nUser question:\n{}",
            self.context, self.user_query
        );

        Prompt { system, user }
    }

    /// Parse the backend's reply. Falls back to treating the whole reply as
    /// the rephrased statement when it is not the requested JSON shape.
    pub fn parse(reply: &str) -> RephraseAnalysis {
        let stripped = strip_fences(reply);
        match serde_json::from_str::<RephraseAnalysis>(stripped) {
            Ok(analysis) if !analysis.rephrased_query.trim().is_empty() => analysis,
            _ => RephraseAnalysis {
                rephrased_query: stripped.trim().to_string(),
                ..Default::default()
            },
        }
    }
}

/// Generate SQL from a rephrased problem. One contract serves both the
/// initial generation (empty feedback and rejects) and the refinement modes;
/// only the feedback/previous_queries content differs.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub rephrased_query: String,
    pub context: String,
    /// Free-text steering from the user, framed as a MODIFY or REGENERATE
    /// task by the refinement loop. Empty on initial generation.
    pub user_feedback: String,
    /// Rendered list of previously tried queries the output must differ from.
    /// Empty outside the regenerate path.
    pub previous_queries: String,
}

impl GenerateRequest {
    pub fn render(&self) -> Prompt {
        let system = "\
You write SQL for an analytical warehouse.

Think step by step:
1. Analyze the required data and any user feedback
2. Identify all necessary tables and their relationships
3. Plan the JOINs needed to connect tables
4. Consider user preferences (readable names vs IDs, formatting)
5. Generate the complete SQL with proper JOINs

Output only the SQL query, nothing else. If previously tried queries are \
listed, the new query MUST differ from every one of them."
            .to_string();

        let mut user = format!(
            "Problem statement:\n{}\n\nContext:\n{}",
            self.rephrased_query, self.context
        );
        if !self.user_feedback.is_empty() {
            user.push_str(&format!("\n\nUser feedback:\n{}", self.user_feedback));
        }
        if !self.previous_queries.is_empty() {
            user.push_str(&format!(
                "\n\nPreviously tried queries that must be avoided:\n{}",
                self.previous_queries
            ));
        }

        Prompt { system, user }
    }
}

/// Classify a candidate query as safe or unsafe for execution.
#[derive(Debug, Clone)]
pub struct SafetyRequest {
    pub sql_query: String,
}

/// Advisory safety classification. The user may override an unsafe verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    pub reason: String,
}

impl SafetyRequest {
    pub fn render(&self) -> Prompt {
        let system = "\
You review SQL queries for dangerous operations before execution against a \
production warehouse. Destructive or irreversible statements (DROP, DELETE, \
TRUNCATE, ALTER, INSERT, broad UPDATE) are unsafe; read-only SELECT \
statements are safe.

Respond with a single JSON object: {\"is_safe\": true|false, \"reason\": \
\"explanation, only when unsafe\"}"
            .to_string();

        Prompt { system, user: format!("SQL query:\n{}", self.sql_query) }
    }

    /// Parse the verdict, tolerating boolean-as-string replies. Unparseable
    /// output is treated as unsafe so the user sees a warning rather than a
    /// silent pass.
    pub fn parse(reply: &str) -> SafetyVerdict {
        let stripped = strip_fences(reply);
        let parsed: Option<(bool, String)> = serde_json::from_str::<Value>(stripped)
            .ok()
            .and_then(|value| {
                let is_safe = match value.get("is_safe") {
                    Some(Value::Bool(b)) => Some(*b),
                    Some(Value::String(s)) => Some(s.trim().eq_ignore_ascii_case("true")),
                    _ => None,
                }?;
                let reason = value
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some((is_safe, reason))
            });

        match parsed {
            Some((true, _)) => {
                SafetyVerdict { is_safe: true, reason: "Query is safe".to_string() }
            }
            Some((false, reason)) => SafetyVerdict {
                is_safe: false,
                reason: if reason.is_empty() {
                    "Flagged as unsafe".to_string()
                } else {
                    reason
                },
            },
            None => SafetyVerdict {
                is_safe: false,
                reason: format!("Unparseable safety verdict: {}", stripped.trim()),
            },
        }
    }
}

/// Strip a Markdown code fence wrapper so JSON replies parse.
fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rephrase_parse_structured_reply() {
        let reply = r#"```json
{"query_intent":"analytical","data_entities":"orders.total","time_dimension":"",
 "aggregation_type":"sum","filters_conditions":"","complexity_level":"simple",
 "rephrased_query":"Sum orders.total grouped by customers.name"}
```"#;
        let analysis = RephraseRequest::parse(reply);
        assert_eq!(analysis.rephrased_query, "Sum orders.total grouped by customers.name");
        assert_eq!(analysis.query_intent, "analytical");
    }

    #[test]
    fn test_rephrase_parse_falls_back_to_raw_text() {
        let analysis = RephraseRequest::parse("Total revenue per customer from orders table");
        assert_eq!(analysis.rephrased_query, "Total revenue per customer from orders table");
        assert!(analysis.query_intent.is_empty());
    }

    #[test]
    fn test_generate_render_omits_empty_sections() {
        let request = GenerateRequest {
            rephrased_query: "problem".into(),
            context: "schema".into(),
            user_feedback: String::new(),
            previous_queries: String::new(),
        };
        let prompt = request.render();
        assert!(!prompt.user.contains("User feedback"));
        assert!(!prompt.user.contains("Previously tried"));
    }

    #[test]
    fn test_generate_render_includes_rejects() {
        let request = GenerateRequest {
            rephrased_query: "problem".into(),
            context: "schema".into(),
            user_feedback: "REGENERATE: wrong table".into(),
            previous_queries: "Failed Query 1: SELECT 1".into(),
        };
        let prompt = request.render();
        assert!(prompt.user.contains("REGENERATE: wrong table"));
        assert!(prompt.user.contains("Failed Query 1: SELECT 1"));
    }

    #[test]
    fn test_safety_parse_variants() {
        assert_eq!(
            SafetyRequest::parse(r#"{"is_safe": true, "reason": ""}"#),
            SafetyVerdict { is_safe: true, reason: "Query is safe".into() }
        );
        assert_eq!(
            SafetyRequest::parse(r#"{"is_safe": "false", "reason": "drops a table"}"#),
            SafetyVerdict { is_safe: false, reason: "drops a table".into() }
        );
        let garbled = SafetyRequest::parse("no idea");
        assert!(!garbled.is_safe);
        assert!(garbled.reason.contains("no idea"));
    }
}
