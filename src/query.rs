//! Query pipeline: embed the question, retrieve the closest records, and
//! generate an answer grounded in them.
//!
//! Input problems (empty question, `top_k` out of range) are rejected before
//! any model call. Model and retrieval failures never reach the caller as
//! errors: they are logged and replaced by [`APOLOGY`]. A Q&A record that
//! cannot be saved is logged and the answer is still returned.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::ModelAdapter;
use crate::config::RetrievalConfig;
use crate::error::{AdapterError, PersistenceError, QueryError, ValidationError};
use crate::models::{QueryAnswer, QuestionRecord};
use crate::prompt;
use crate::settle::bounded;
use crate::store::Store;

/// Returned in place of an answer when embedding, retrieval, or generation fails.
pub const APOLOGY: &str =
    "I apologize, but I encountered an error while answering your question. Please try again in a moment.";

pub struct QueryEngine {
    store: Arc<dyn Store>,
    adapter: Arc<dyn ModelAdapter>,
    retrieval: RetrievalConfig,
    call_timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn Store>,
        adapter: Arc<dyn ModelAdapter>,
        retrieval: RetrievalConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            adapter,
            retrieval,
            call_timeout,
        }
    }

    /// Check the inputs and resolve the effective `top_k`.
    pub fn validate<'q>(
        &self,
        question: &'q str,
        top_k: Option<usize>,
    ) -> Result<(&'q str, usize), ValidationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        let k = top_k.unwrap_or(self.retrieval.default_top_k);
        if k == 0 || k > self.retrieval.max_top_k {
            return Err(ValidationError::TopKOutOfRange {
                got: k,
                max: self.retrieval.max_top_k,
            });
        }
        Ok((question, k))
    }

    /// Answer `question` from the records of `project_id`.
    ///
    /// # Errors
    ///
    /// Only [`QueryError::Validation`], for bad input. Everything else degrades
    /// into the answer.
    pub async fn ask(
        &self,
        project_id: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<QueryAnswer, QueryError> {
        let (question, k) = self.validate(question, top_k)?;

        let query_vector = match bounded(
            self.call_timeout,
            self.adapter.embed(question),
            AdapterError::Timeout,
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(project_id, error = %e, "failed to embed question");
                return Ok(apology(Vec::new()));
            }
        };

        let sources = match bounded(
            self.call_timeout,
            self.store.top_k(project_id, &query_vector, k),
            PersistenceError::Timeout,
        )
        .await
        {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!(project_id, error = %e, "failed to retrieve context");
                return Ok(apology(Vec::new()));
            }
        };
        tracing::debug!(project_id, k, hits = sources.len(), "retrieved context");

        let context = prompt::build_context(&sources, self.retrieval.source_preview_chars);
        let answer = match bounded(
            self.call_timeout,
            self.adapter.generate(&prompt::answer_prompt(question, &context)),
            AdapterError::Timeout,
        )
        .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::error!(project_id, error = %e, "failed to generate answer");
                return Ok(apology(sources));
            }
        };

        let record = QuestionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            question: question.to_string(),
            answer: answer.clone(),
            file_references: sources.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };
        let question_id = match bounded(
            self.call_timeout,
            self.store.save_question(&record),
            PersistenceError::Timeout,
        )
        .await
        {
            Ok(()) => Some(record.id),
            Err(e) => {
                tracing::warn!(project_id, error = %e, "failed to save question, returning answer anyway");
                None
            }
        };

        Ok(QueryAnswer {
            answer,
            sources,
            question_id,
        })
    }
}

fn apology(sources: Vec<crate::models::FileReference>) -> QueryAnswer {
    QueryAnswer {
        answer: APOLOGY.to_string(),
        sources,
        question_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailurePlan, InMemoryStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        prompts: Mutex<Vec<String>>,
        fail_embed: bool,
        fail_generate: bool,
    }

    #[async_trait]
    impl ModelAdapter for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AdapterError> {
            if self.fail_embed {
                return Err(AdapterError::Unavailable("embedder down".into()));
            }
            Ok(vec![1.0, 0.0, 0.0])
        }
        async fn generate(&self, prompt: &str) -> Result<String, AdapterError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail_generate {
                Err(AdapterError::Unavailable("boom".into()))
            } else {
                Ok(" It adds. ".into())
            }
        }
    }

    fn engine(adapter: Arc<Recording>) -> QueryEngine {
        engine_with(InMemoryStore::new(), adapter)
    }

    fn engine_with(store: InMemoryStore, adapter: Arc<Recording>) -> QueryEngine {
        QueryEngine::new(
            Arc::new(store),
            adapter,
            RetrievalConfig::default(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let e = engine(Arc::new(Recording::default()));
        assert_eq!(e.validate("   ", None), Err(ValidationError::EmptyQuestion));
        assert_eq!(
            e.validate("q", Some(0)),
            Err(ValidationError::TopKOutOfRange { got: 0, max: 20 })
        );
        assert_eq!(
            e.validate("q", Some(21)),
            Err(ValidationError::TopKOutOfRange { got: 21, max: 20 })
        );
        assert_eq!(e.validate(" q ", None), Ok(("q", 5)));
    }

    #[tokio::test]
    async fn test_validation_happens_before_model_calls() {
        let adapter = Arc::new(Recording::default());
        let e = engine(adapter.clone());
        assert!(matches!(
            e.ask("p", "", None).await,
            Err(QueryError::Validation(ValidationError::EmptyQuestion))
        ));
        assert!(adapter.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_still_generates_with_notice() {
        let adapter = Arc::new(Recording::default());
        let e = engine(adapter.clone());
        let answer = e.ask("p", "what is this?", None).await.unwrap();
        assert_eq!(answer.answer, "It adds.");
        assert!(answer.sources.is_empty());
        assert!(answer.question_id.is_some());
        assert!(adapter.prompts.lock().unwrap()[0].contains(prompt::EMPTY_CONTEXT_NOTICE));
    }

    #[tokio::test]
    async fn test_generation_failure_is_apology() {
        let adapter = Arc::new(Recording {
            fail_generate: true,
            ..Default::default()
        });
        let e = engine(adapter);
        let answer = e.ask("p", "what is this?", None).await.unwrap();
        assert_eq!(answer.answer, APOLOGY);
        assert!(answer.question_id.is_none());
    }

    #[tokio::test]
    async fn test_embed_failure_is_apology() {
        let adapter = Arc::new(Recording {
            fail_embed: true,
            ..Default::default()
        });
        let e = engine(adapter.clone());
        let answer = e.ask("p", "what is this?", None).await.unwrap();
        assert_eq!(answer.answer, APOLOGY);
        assert!(answer.sources.is_empty());
        assert!(answer.question_id.is_none());
        assert!(adapter.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_apology() {
        let store = InMemoryStore::with_failures(FailurePlan {
            retrievals: true,
            ..Default::default()
        });
        let adapter = Arc::new(Recording::default());
        let e = engine_with(store, adapter.clone());

        let answer = e.ask("p", "what is this?", None).await.unwrap();
        assert_eq!(answer.answer, APOLOGY);
        assert!(answer.sources.is_empty());
        assert!(answer.question_id.is_none());
        // No generation without context.
        assert!(adapter.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsaved_question_still_returns_answer() {
        let store = InMemoryStore::with_failures(FailurePlan {
            question_writes: true,
            ..Default::default()
        });
        let adapter = Arc::new(Recording::default());
        let e = engine_with(store, adapter);

        let answer = e.ask("p", "what is this?", None).await.unwrap();
        assert_eq!(answer.answer, "It adds.");
        assert!(answer.question_id.is_none());
    }
}
