//! SQL text utilities: normalization and best-effort table extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CODE_FENCE_REGEX: Regex = Regex::new(r"```(?:sql)?\s*").unwrap();
    static ref BACKTICK_REGEX: Regex = Regex::new(r"`+").unwrap();
    static ref LINE_COMMENT_REGEX: Regex = Regex::new(r"--[^\n]*").unwrap();
    static ref BLOCK_COMMENT_REGEX: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref TABLE_REF_REGEX: Regex = Regex::new(r"(?i)\b(?:FROM|JOIN)\s+(\w+)").unwrap();
}

/// Normalize model output into canonical SQL text.
///
/// Strips Markdown code fences and stray backticks, removes `--` line
/// comments and `/* */` block comments, collapses whitespace runs to single
/// spaces and trims. The result is the canonical form used for duplicate
/// tracking, display, and execution. Idempotent.
pub fn clean_sql(sql: &str) -> String {
    if sql.is_empty() {
        return String::new();
    }

    let cleaned = CODE_FENCE_REGEX.replace_all(sql, "");
    let mut cleaned = BACKTICK_REGEX.replace_all(&cleaned, "").into_owned();

    // Removing a comment can splice the surrounding text into a new comment
    // marker ("-/*x*/-" becomes "--"), so strip to a fixpoint.
    loop {
        let pass = BLOCK_COMMENT_REGEX.replace_all(&cleaned, "");
        let pass = LINE_COMMENT_REGEX.replace_all(&pass, "").into_owned();
        if pass == cleaned {
            break;
        }
        cleaned = pass;
    }

    let cleaned = WHITESPACE_REGEX.replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// Extract table names referenced after FROM/JOIN keywords, deduplicated,
/// in order of first mention.
///
/// This is a heuristic for learning-record bookkeeping, not a SQL parser:
/// CTE names, subquery aliases, and schema-qualified names are reported as
/// written or missed entirely. Query generation never depends on it.
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for capture in TABLE_REF_REGEX.captures_iter(sql) {
        let name = capture[1].to_string();
        if !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}
