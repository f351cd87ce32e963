//! Item bank contract. Content storage is an external collaborator; the
//! engine only depends on this trait.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::types::{DifficultyLabel, Question, Subject};

#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub skill_id: Option<String>,
    pub subject: Option<Subject>,
    pub difficulty_label: Option<DifficultyLabel>,
    pub exclude_ids: Vec<String>,
}

#[async_trait]
pub trait ItemBank: Send + Sync {
    async fn fetch_candidates(&self, filter: &CandidateFilter)
        -> Result<Vec<Question>, EngineError>;
}

/// In-memory bank for tests and embedded use.
#[derive(Default)]
pub struct InMemoryItemBank {
    questions: RwLock<Vec<Question>>,
}

impl InMemoryItemBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: RwLock::new(questions),
        }
    }

    pub fn add(&self, question: Question) {
        self.questions.write().push(question);
    }

    pub fn len(&self) -> usize {
        self.questions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.read().is_empty()
    }
}

#[async_trait]
impl ItemBank for InMemoryItemBank {
    async fn fetch_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<Question>, EngineError> {
        let questions = self.questions.read();
        Ok(questions
            .iter()
            .filter(|q| {
                filter
                    .skill_id
                    .as_deref()
                    .map(|s| q.skill_id == s)
                    .unwrap_or(true)
            })
            .filter(|q| filter.subject.map(|s| q.subject == s).unwrap_or(true))
            .filter(|q| {
                filter
                    .difficulty_label
                    .map(|d| q.difficulty_label == d)
                    .unwrap_or(true)
            })
            .filter(|q| !filter.exclude_ids.iter().any(|id| id == &q.id))
            .cloned()
            .collect())
    }
}
