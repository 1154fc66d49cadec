use std::sync::Arc;

use chrono::Duration;
use quiz_core::model::{
    CategoryScope, NewSession, OptionId, QuestionId, SeedStrategy, Session, SessionId,
    SessionStatus, UserAnswer, UserId,
};
use quiz_core::scoring::ScoreReport;
use serde::Serialize;
use storage::repository::{
    AnswerRepository, CompletionPersistence, SessionRepository, StorageError,
};
use tracing::instrument;

use super::progress::SessionProgress;
use crate::Clock;
use crate::content_service::ContentService;
use crate::error::SessionError;
use crate::events::{self, QuizEventSink};
use crate::scoring_service::ScoringService;
use crate::selection;
use crate::settings_service::SettingsService;

/// Per-call overrides for `start_session`. Unset fields fall back to settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartConfig {
    pub question_count: Option<u32>,
    pub seed: Option<u64>,
}

/// Result of a successful `complete_session`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedSession {
    pub session: Session,
    pub report: ScoreReport,
}

/// Owns the session lifecycle: start, answer, complete, abandon.
#[derive(Clone)]
pub struct SessionManager {
    clock: Clock,
    content: Arc<ContentService>,
    settings: Arc<SettingsService>,
    scoring: Arc<ScoringService>,
    sessions: Arc<dyn SessionRepository>,
    answers: Arc<dyn AnswerRepository>,
    completion: Arc<dyn CompletionPersistence>,
    events: Arc<dyn QuizEventSink>,
}

impl SessionManager {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Clock,
        content: Arc<ContentService>,
        settings: Arc<SettingsService>,
        scoring: Arc<ScoringService>,
        sessions: Arc<dyn SessionRepository>,
        answers: Arc<dyn AnswerRepository>,
        completion: Arc<dyn CompletionPersistence>,
        events: Arc<dyn QuizEventSink>,
    ) -> Self {
        Self {
            clock,
            content,
            settings,
            scoring,
            sessions,
            answers,
            completion,
            events,
        }
    }

    /// Start a session for `user_id` drawing from `scope`.
    ///
    /// Settings are read once; the session snapshots its seed, sequence and
    /// pass threshold so later settings changes never affect it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Conflict` if the user already has an active
    /// session and concurrent sessions are disabled, and
    /// `SessionError::InsufficientContent` when the pool is too small.
    #[instrument(skip(self))]
    pub async fn start_session(
        &self,
        user_id: UserId,
        scope: CategoryScope,
        config: StartConfig,
    ) -> Result<Session, SessionError> {
        let settings = self.settings.load().await?;
        let count = config
            .question_count
            .unwrap_or_else(|| settings.questions_per_session());
        let seed = config.seed.unwrap_or_else(|| match settings.random_seed_strategy() {
            SeedStrategy::Fixed => settings.fixed_seed(),
            SeedStrategy::PerSession => selection::fresh_seed(),
        });

        let questions = self
            .content
            .get_questions(scope, count, Some(seed), settings.short_fill_allowed())
            .await?;
        let new_session = NewSession::new(
            user_id,
            scope,
            questions.iter().map(|q| q.id()).collect(),
            seed,
            settings.pass_threshold(),
            self.clock.now(),
        )?;

        let exclusive = !settings.allow_concurrent_sessions();
        let session = match self.sessions.create_session(&new_session, exclusive).await {
            Ok(session) => session,
            Err(StorageError::Conflict) => {
                tracing::warn!(%user_id, "start rejected: active session exists");
                return Err(SessionError::Conflict { user_id });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            session_id = %session.id(),
            %user_id,
            %scope,
            seed,
            questions = session.len(),
            "session started"
        );
        Ok(session)
    }

    /// Record (or replace) the answer to one question. `None` records an
    /// explicit skip. Repeating the stored choice returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound`, `InvalidState`, `NotInSession` or
    /// `InvalidOption` per the failed check.
    #[instrument(skip(self))]
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        option_id: Option<OptionId>,
    ) -> Result<UserAnswer, SessionError> {
        let session = self.load(session_id).await?;
        ensure_active(&session)?;
        if !session.contains(question_id) {
            return Err(SessionError::NotInSession { question_id });
        }

        let is_correct = match option_id {
            Some(option_id) => {
                let option = self
                    .content
                    .find_option(option_id)
                    .await?
                    .filter(|o| o.question_id == question_id)
                    .ok_or(SessionError::InvalidOption {
                        option_id,
                        question_id,
                    })?;
                option.is_correct
            }
            None => false,
        };

        let answer = UserAnswer::new(
            session_id,
            question_id,
            option_id,
            is_correct,
            self.clock.now(),
        );
        let stored = match self.answers.upsert_answer(&answer).await {
            Ok(stored) => stored,
            // lost a race with complete/abandon
            Err(StorageError::Conflict) => return Err(self.state_error(session_id).await),
            Err(StorageError::NotFound) => return Err(SessionError::NotFound(session_id)),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(%session_id, %question_id, ?option_id, "answer stored");
        Ok(stored)
    }

    /// Grade the session, mark it completed and fold its stats, all or
    /// nothing. Unanswered questions count as incorrect.
    ///
    /// A session has a single owner: answers are read before the status
    /// flips, so an answer submitted concurrently with this call is stored
    /// but not counted in the recorded score.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` if the session is already terminal,
    /// including when a concurrent call completed it first.
    #[instrument(skip(self))]
    pub async fn complete_session(
        &self,
        session_id: SessionId,
    ) -> Result<CompletedSession, SessionError> {
        let mut session = self.load(session_id).await?;
        ensure_active(&session)?;

        let report = self.scoring.grade(&session).await?;
        let score = report.score();
        let deltas = report.stats_deltas();
        let now = self.clock.now();

        if !self
            .completion
            .complete_session(session_id, now, score, &deltas)
            .await?
        {
            tracing::warn!(%session_id, "completion lost to a concurrent transition");
            return Err(self.state_error(session_id).await);
        }
        session.complete(now, score)?;

        tracing::info!(
            %session_id,
            user_id = %session.user_id(),
            correct = report.correct,
            total = report.total,
            passed = report.passed,
            "session completed"
        );
        events::notify_completed(self.events.as_ref(), &session, &report);
        Ok(CompletedSession { session, report })
    }

    /// Move an active session to `abandoned`. Stats are never touched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` or `SessionError::InvalidState`.
    #[instrument(skip(self))]
    pub async fn abandon_session(&self, session_id: SessionId) -> Result<Session, SessionError> {
        let mut session = self.load(session_id).await?;
        ensure_active(&session)?;

        let now = self.clock.now();
        if !self.sessions.abandon_session(session_id, now).await? {
            return Err(self.state_error(session_id).await);
        }
        session.abandon(now)?;

        tracing::info!(%session_id, user_id = %session.user_id(), "session abandoned");
        events::notify_abandoned(self.events.as_ref(), &session);
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the session does not exist.
    pub async fn get_session(&self, session_id: SessionId) -> Result<Session, SessionError> {
        self.load(session_id).await
    }

    /// Most recent sessions of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on storage failures.
    pub async fn list_sessions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Session>, SessionError> {
        Ok(self.sessions.list_sessions(user_id, limit).await?)
    }

    /// # Errors
    ///
    /// Returns `SessionError` on storage failures.
    pub async fn active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, SessionError> {
        Ok(self.sessions.active_sessions(user_id).await?)
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the session does not exist.
    pub async fn progress(&self, session_id: SessionId) -> Result<SessionProgress, SessionError> {
        let session = self.load(session_id).await?;
        let answers = self.answers.list_answers(session_id).await?;
        Ok(SessionProgress::from_answers(&session, &answers))
    }

    /// Stored answers of a session ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the session does not exist.
    pub async fn answers(&self, session_id: SessionId) -> Result<Vec<UserAnswer>, SessionError> {
        self.load(session_id).await?;
        Ok(self.answers.list_answers(session_id).await?)
    }

    /// Delete a session with its answers. Stats already folded stay.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the session does not exist.
    #[instrument(skip(self))]
    pub async fn delete_session(&self, session_id: SessionId) -> Result<(), SessionError> {
        match self.sessions.delete_session(session_id).await {
            Ok(()) => {
                tracing::info!(%session_id, "session deleted");
                Ok(())
            }
            Err(StorageError::NotFound) => Err(SessionError::NotFound(session_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Abandon every active session created more than `older_than` ago.
    ///
    /// Returns the ids that were abandoned by this call.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on storage failures.
    #[instrument(skip(self))]
    pub async fn abandon_stale(&self, older_than: Duration) -> Result<Vec<SessionId>, SessionError> {
        let cutoff = self.clock.cutoff(older_than);
        let now = self.clock.now();
        let mut abandoned = Vec::new();
        for mut session in self.sessions.stale_sessions(cutoff).await? {
            if !self.sessions.abandon_session(session.id(), now).await? {
                continue;
            }
            session.abandon(now)?;
            events::notify_abandoned(self.events.as_ref(), &session);
            abandoned.push(session.id());
        }
        if !abandoned.is_empty() {
            tracing::warn!(count = abandoned.len(), %cutoff, "abandoned stale sessions");
        }
        Ok(abandoned)
    }

    async fn load(&self, session_id: SessionId) -> Result<Session, SessionError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Error for a session that left `active` underneath us.
    async fn state_error(&self, session_id: SessionId) -> SessionError {
        match self.sessions.get_session(session_id).await {
            Ok(Some(session)) => SessionError::InvalidState {
                status: session.status(),
            },
            Ok(None) => SessionError::NotFound(session_id),
            Err(e) => e.into(),
        }
    }
}

fn ensure_active(session: &Session) -> Result<(), SessionError> {
    match session.status() {
        SessionStatus::Active => Ok(()),
        status => Err(SessionError::InvalidState { status }),
    }
}
