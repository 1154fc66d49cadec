use std::sync::Arc;

use quiz_core::model::{Session, SessionId};
use quiz_core::scoring::{self, ScoreReport};
use storage::repository::{AnswerRepository, SessionRepository};

use crate::content_service::ContentService;
use crate::error::ScoringServiceError;

/// Grades sessions from stored answers and the content answer key.
#[derive(Clone)]
pub struct ScoringService {
    content: Arc<ContentService>,
    sessions: Arc<dyn SessionRepository>,
    answers: Arc<dyn AnswerRepository>,
}

impl ScoringService {
    #[must_use]
    pub fn new(
        content: Arc<ContentService>,
        sessions: Arc<dyn SessionRepository>,
        answers: Arc<dyn AnswerRepository>,
    ) -> Self {
        Self {
            content,
            sessions,
            answers,
        }
    }

    /// Grade a stored session without changing it.
    ///
    /// # Errors
    ///
    /// Returns `ScoringServiceError::SessionNotFound` for an unknown session,
    /// and content or scoring errors when the answer key is incomplete.
    pub async fn grade_session(
        &self,
        session_id: SessionId,
    ) -> Result<ScoreReport, ScoringServiceError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(ScoringServiceError::SessionNotFound(session_id))?;
        self.grade(&session).await
    }

    /// Grade an already loaded session.
    ///
    /// # Errors
    ///
    /// Returns `ScoringServiceError` when the key cannot be built or the
    /// answers cannot be read.
    pub async fn grade(&self, session: &Session) -> Result<ScoreReport, ScoringServiceError> {
        let key = self.content.answer_key(session.question_ids()).await?;
        let answers = self.answers.list_answers(session.id()).await?;
        Ok(scoring::grade(session, &answers, &key)?)
    }
}
