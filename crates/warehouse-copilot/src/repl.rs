//! Interactive query session: the natural-language prompt, the
//! approve/modify/regenerate refinement loop, safety confirmation, execution,
//! and post-execution feedback.

use crate::executor::QueryExecutor;
use crate::refinement::{Decision, QueryProcessor, RefinementSession};
use anyhow::Result;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::debug;

/// Post-execution rating. Parsed leniently from single-letter input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAction {
    Good,
    Fix,
    Wrong,
}

impl FeedbackAction {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "g" | "good" => Some(Self::Good),
            "f" | "fix" => Some(Self::Fix),
            "w" | "wrong" => Some(Self::Wrong),
            _ => None,
        }
    }
}

/// Invalid post-execution inputs tolerated before giving up on the rating.
const MAX_FEEDBACK_PROMPTS: usize = 3;

pub struct InteractiveSession {
    processor: QueryProcessor,
    executor: Arc<dyn QueryExecutor>,
    verbose: bool,
}

impl InteractiveSession {
    pub fn new(
        processor: QueryProcessor,
        executor: Arc<dyn QueryExecutor>,
        verbose: bool,
    ) -> Self {
        Self { processor, executor, verbose }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("🤖 Warehouse Query Assistant");
        println!("Type your questions in natural language. Commands: 'exit', 'history', 'help'");

        loop {
            let Some(input) = read_line("\n💬 ") else {
                break;
            };
            let input = input.trim().to_string();
            if input.is_empty() {
                continue;
            }

            match input.to_lowercase().as_str() {
                "exit" | "quit" => {
                    println!("👋 Goodbye!");
                    break;
                }
                "history" => {
                    self.show_history();
                    continue;
                }
                "clear" => {
                    self.processor.clear_history();
                    println!("🧹 Conversation history cleared!");
                    continue;
                }
                "help" => {
                    print_help();
                    continue;
                }
                _ => {}
            }

            // A single turn's failure never takes the session down.
            if let Err(e) = self.handle_turn(&input).await {
                if self.verbose {
                    println!("\n❌ Error: {e:#}");
                } else {
                    println!("\n❌ Something went wrong. Try rephrasing your question.");
                    debug!("Turn failed: {e:#}");
                }
            }
        }

        Ok(())
    }

    async fn handle_turn(&mut self, user_query: &str) -> Result<()> {
        let outcome = self.processor.process_query(user_query).await?;

        let Some(initial_sql) = outcome.sql_query else {
            println!("\n❌ {}", outcome.reason);
            return Ok(());
        };

        let Some(approved_sql) = self.refine(user_query, &initial_sql).await? else {
            return Ok(());
        };

        let verdict = self.processor.check_sql_safety(&approved_sql).await?;
        if !verdict.is_safe {
            println!("\n⚠️  Safety warning: {}", verdict.reason);
            match read_line("Execute anyway? (yes/no): ") {
                Some(answer) if answer.trim().eq_ignore_ascii_case("yes") => {}
                _ => return Ok(()),
            }
        } else {
            match read_line("\n▶️  Execute this query? (yes/no): ") {
                Some(answer) if answer.trim().eq_ignore_ascii_case("yes") => {}
                _ => return Ok(()),
            }
        }

        let rows = self.executor.execute(&approved_sql).await;
        if rows.is_empty() {
            println!("\n❌ No results returned");
            return Ok(());
        }

        println!("\n📊 Results ({} rows):", rows.len());
        for (i, row) in rows.iter().take(10).enumerate() {
            println!("  {}. {}", i + 1, row);
        }
        if rows.len() > 10 {
            println!("  ... and {} more rows", rows.len() - 10);
        }

        self.post_execution_feedback(user_query, &approved_sql)?;
        Ok(())
    }

    /// Drive the refinement loop until approval, rejection, or the iteration
    /// cap. Returns the approved SQL, or `None` on cancellation.
    async fn refine(&mut self, user_query: &str, initial_sql: &str) -> Result<Option<String>> {
        let mut session = RefinementSession::new(user_query, initial_sql, &self.processor);

        loop {
            println!("\n🔍 Generated SQL:");
            println!("```sql\n{}\n```", session.current_sql());

            if session.at_iteration_cap() {
                println!(
                    "❌ Refinement limit reached after {} attempts. Query cancelled.",
                    session.iterations()
                );
                return Ok(None);
            }

            let Some(input) = read_line("\n🤔 Is this what you want? (yes/no/modify/regenerate): ")
            else {
                return Ok(None);
            };

            match Decision::parse(&input) {
                Some(Decision::Approve) => {
                    return Ok(Some(session.current_sql().to_string()));
                }
                Some(Decision::Reject) => {
                    println!("❌ Query cancelled.");
                    return Ok(None);
                }
                Some(Decision::Modify) => {
                    println!("\n🔧 What type of modification do you need?");
                    println!("  Examples:");
                    println!("  • 'Add a filter for status = active'");
                    println!("  • 'Group by month instead of day'");
                    println!("  • 'Sort by revenue descending'");

                    let Some(modification) = read_line("\n💭 Describe the modification: ") else {
                        return Ok(None);
                    };
                    let modification = modification.trim().to_string();
                    if modification.is_empty() {
                        println!("❌ No modification specified.");
                        continue;
                    }
                    println!("🔄 Modifying query: {modification}");
                    session.modify(&mut self.processor, &modification).await?;
                }
                Some(Decision::Regenerate) => {
                    println!("\n🔄 Why do you want to regenerate?");
                    println!("  Examples:");
                    println!("  • 'This approach is completely wrong'");
                    println!("  • 'Need a different table/approach'");
                    println!("  • 'Wrong aggregation method'");

                    let Some(reason) = read_line("\n💭 What's wrong with this approach? ") else {
                        return Ok(None);
                    };
                    let reason = reason.trim().to_string();
                    if reason.is_empty() {
                        println!("❌ No regeneration reason provided.");
                        continue;
                    }
                    println!("🔄 Regenerating from scratch: {reason}");
                    session.regenerate(&mut self.processor, &reason).await?;
                }
                None => {
                    println!("❓ Please answer 'yes', 'no', 'modify', or 'regenerate'");
                }
            }
        }
    }

    /// Bounded rating loop; invalid input re-prompts a fixed number of times
    /// instead of recursing.
    fn post_execution_feedback(&mut self, user_query: &str, sql_query: &str) -> Result<()> {
        for _ in 0..MAX_FEEDBACK_PROMPTS {
            let Some(input) = read_line("\nRate this query: (g)ood / (f)ix / (w)rong: ") else {
                return Ok(());
            };

            match FeedbackAction::parse(&input) {
                Some(FeedbackAction::Good) => {
                    println!("✅ Great! Storing this successful query for future reference.");
                    self.processor.store_successful_query(
                        user_query,
                        sql_query,
                        "User approved and executed successfully",
                    )?;
                    return Ok(());
                }
                Some(FeedbackAction::Fix) => {
                    let refinement = read_line("What needs fixing? ").unwrap_or_default();
                    let refinement = refinement.trim();
                    println!("🔧 Noted: '{refinement}' - please ask a refined follow-up question.");
                    self.processor.store_successful_query(
                        user_query,
                        sql_query,
                        &format!("Query needed refinement: {refinement}"),
                    )?;
                    return Ok(());
                }
                Some(FeedbackAction::Wrong) => {
                    let reason = read_line("What went wrong? (optional): ").unwrap_or_default();
                    let reason = reason.trim();
                    println!("🔄 Thanks for the feedback. Please try rephrasing your question.");
                    self.processor.record_attempt(
                        user_query,
                        sql_query,
                        &format!("Query failed because: {reason}"),
                    );
                    return Ok(());
                }
                None => println!("Please enter 'g', 'f', or 'w'"),
            }
        }
        Ok(())
    }

    fn show_history(&self) {
        let memory = self.processor.memory();
        if memory.is_empty() {
            println!("No conversation history available.");
            return;
        }

        println!("\n{}", "=".repeat(60));
        println!("CONVERSATION HISTORY (Last {} conversations)", memory.len());
        println!("{}", "=".repeat(60));

        for (i, turn) in memory.turns().enumerate() {
            println!(
                "\n--- Conversation {} ({}) ---",
                i + 1,
                turn.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
            println!("User Query: {}", turn.user_query);
            println!("Generated SQL: {}", turn.sql_query);
            if !turn.feedback.is_empty() {
                println!("User Feedback: {}", turn.feedback);
            }
            println!("Status: {}", if turn.succeeded { "✅ Successful" } else { "❌ Not completed" });
        }

        println!("\n{}", "=".repeat(60));
    }
}

fn print_help() {
    println!("\n📖 Available commands:");
    println!("  • Type natural language questions about your data");
    println!("  • 'history' - Show conversation history");
    println!("  • 'clear' - Clear conversation history");
    println!("  • 'exit' or 'quit' - Exit the assistant");
}

/// Prompt and read one line from stdin. `None` on EOF.
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();

    let mut buffer = String::new();
    match io::stdin().read_line(&mut buffer) {
        Ok(0) => None,
        Ok(_) => Some(buffer.trim_end_matches(['\n', '\r']).to_string()),
        Err(_) => None,
    }
}
