//! The interactive query-refinement engine: the per-turn generation pipeline
//! and the approve/modify/regenerate loop driven by user decisions.

pub mod processor;
pub mod session;

pub use processor::{ProcessOutcome, QueryProcessor};
pub use session::{Decision, RefinementSession};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::completion::{CompletionBackend, Prompt};
    use crate::config::{self, Config};
    use crate::context_engine::ContextBuilder;
    use crate::learning::LearningSink;
    use crate::metadata::{test_record, MetadataRecord};
    use crate::refinement::QueryProcessor;
    use crate::search::{LearningHit, SearchHit, SemanticSearch};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Scripted completion backend: pops canned replies in order and records
    /// every prompt it was given.
    pub struct FakeBackend {
        replies: Mutex<VecDeque<String>>,
        pub calls: Mutex<Vec<Prompt>>,
    }

    impl FakeBackend {
        pub fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<Prompt> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(&self, prompt: Prompt) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(prompt);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("FakeBackend ran out of scripted replies"))
        }
    }

    pub struct FakeSearch {
        pub hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl SemanticSearch for FakeSearch {
        async fn search(&self, _query: &str, _top_k: usize) -> anyhow::Result<Vec<SearchHit>> {
            Ok(self.hits.clone())
        }

        async fn search_learnings(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> anyhow::Result<Vec<LearningHit>> {
            Ok(Vec::new())
        }
    }

    pub struct Fixture {
        pub backend: Arc<FakeBackend>,
        pub processor: QueryProcessor,
        // Held so the catalog and log outlive the processor.
        _dir: tempfile::TempDir,
    }

    /// Processor wired to fakes over a two-table catalog (orders, customers).
    pub fn fixture(replies: &[&str], with_hits: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("metadata.jsonl");
        let records: Vec<MetadataRecord> = vec![
            test_record("orders", "id", "UInt64"),
            test_record("orders", "total", "Float64"),
            test_record("customers", "id", "UInt64"),
            test_record("customers", "name", "String"),
        ];
        let mut file = std::fs::File::create(&catalog_path).unwrap();
        for record in &records {
            writeln!(file, "{}", serde_json::to_string(record).unwrap()).unwrap();
        }

        let mut cfg: Config = config::test_config();
        cfg.metadata_file = catalog_path.to_string_lossy().into_owned();
        cfg.learnings_file = dir.path().join("learnings.md").to_string_lossy().into_owned();

        let hits = if with_hits {
            vec![
                SearchHit {
                    relevance: 0.9,
                    table_name: "orders".to_string(),
                    column_name: "total".to_string(),
                },
                SearchHit {
                    relevance: 0.8,
                    table_name: "customers".to_string(),
                    column_name: "name".to_string(),
                },
            ]
        } else {
            Vec::new()
        };

        let backend = FakeBackend::new(replies);
        let search = Arc::new(FakeSearch { hits });
        let processor = QueryProcessor::new(
            ContextBuilder::new(search, &cfg),
            backend.clone(),
            LearningSink::new(&cfg.learnings_file),
            &cfg,
        );

        Fixture { backend, processor, _dir: dir }
    }
}
