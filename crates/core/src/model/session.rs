use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CategoryId, QuestionId, SessionId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session must contain at least one question")]
    EmptySequence,

    #[error("question {0} appears more than once in the session")]
    DuplicateQuestion(QuestionId),

    #[error("session is {status}, expected active")]
    NotActive { status: SessionStatus },

    #[error("session ended before it was created")]
    InvalidTimeRange,

    #[error("{status} session is missing its end time")]
    MissingEndTime { status: SessionStatus },

    #[error("completed session is missing its score")]
    MissingScore,

    #[error("score {correct}/{total} does not fit a session of {len} questions")]
    ScoreOutOfRange { correct: u32, total: u32, len: usize },

    #[error("pass threshold must be within 0..=100, got {0}")]
    InvalidPassThreshold(u8),

    #[error("unknown session status: {0}")]
    UnknownStatus(String),

    #[error("unknown session scope: {0}")]
    UnknownScope(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle state of a session. `Completed` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(SessionStateError::UnknownStatus(other.to_owned())),
        }
    }
}

//
// ─── SCOPE ─────────────────────────────────────────────────────────────────────
//

/// Where a session draws its questions from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum CategoryScope {
    Category(CategoryId),
    /// Questions from every category.
    Mixed,
}

impl CategoryScope {
    #[must_use]
    pub fn category_id(self) -> Option<CategoryId> {
        match self {
            CategoryScope::Category(id) => Some(id),
            CategoryScope::Mixed => None,
        }
    }
}

impl fmt::Display for CategoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryScope::Category(id) => write!(f, "category:{id}"),
            CategoryScope::Mixed => f.write_str("mixed"),
        }
    }
}

impl FromStr for CategoryScope {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "mixed" {
            return Ok(CategoryScope::Mixed);
        }
        s.strip_prefix("category:")
            .unwrap_or(s)
            .parse::<CategoryId>()
            .map(CategoryScope::Category)
            .map_err(|_| SessionStateError::UnknownScope(s.to_owned()))
    }
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Final tally stored on a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionScore {
    pub correct: u32,
    pub total: u32,
}

impl SessionScore {
    #[must_use]
    pub fn percentage(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.correct) * 100.0 / f64::from(self.total)
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// A session that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: UserId,
    pub scope: CategoryScope,
    pub question_ids: Vec<QuestionId>,
    pub seed: u64,
    pub pass_threshold: u8,
    pub created_at: DateTime<Utc>,
}

impl NewSession {
    /// Build a new active session around a fixed question sequence.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the sequence is empty or has duplicates,
    /// or the pass threshold is above 100.
    pub fn new(
        user_id: UserId,
        scope: CategoryScope,
        question_ids: Vec<QuestionId>,
        seed: u64,
        pass_threshold: u8,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        validate_sequence(&question_ids)?;
        if pass_threshold > 100 {
            return Err(SessionStateError::InvalidPassThreshold(pass_threshold));
        }
        Ok(Self {
            user_id,
            scope,
            question_ids,
            seed,
            pass_threshold,
            created_at,
        })
    }

    #[must_use]
    pub fn assign_id(self, id: SessionId) -> Session {
        Session {
            id,
            user_id: self.user_id,
            scope: self.scope,
            question_ids: self.question_ids,
            seed: self.seed,
            pass_threshold: self.pass_threshold,
            status: SessionStatus::Active,
            created_at: self.created_at,
            ended_at: None,
            score: None,
        }
    }
}

fn validate_sequence(question_ids: &[QuestionId]) -> Result<(), SessionStateError> {
    if question_ids.is_empty() {
        return Err(SessionStateError::EmptySequence);
    }
    let mut seen = HashSet::with_capacity(question_ids.len());
    for id in question_ids {
        if !seen.insert(*id) {
            return Err(SessionStateError::DuplicateQuestion(*id));
        }
    }
    Ok(())
}

/// One user's attempt at a fixed sequence of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    scope: CategoryScope,
    question_ids: Vec<QuestionId>,
    seed: u64,
    pass_threshold: u8,
    status: SessionStatus,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    score: Option<SessionScore>,
}

impl Session {
    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` when the stored row is internally inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        scope: CategoryScope,
        question_ids: Vec<QuestionId>,
        seed: u64,
        pass_threshold: u8,
        status: SessionStatus,
        created_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        score: Option<SessionScore>,
    ) -> Result<Self, SessionStateError> {
        validate_sequence(&question_ids)?;
        if pass_threshold > 100 {
            return Err(SessionStateError::InvalidPassThreshold(pass_threshold));
        }
        if status.is_terminal() && ended_at.is_none() {
            return Err(SessionStateError::MissingEndTime { status });
        }
        if ended_at.is_some_and(|end| end < created_at) {
            return Err(SessionStateError::InvalidTimeRange);
        }
        if status == SessionStatus::Completed && score.is_none() {
            return Err(SessionStateError::MissingScore);
        }
        if let Some(score) = score {
            check_score(score, question_ids.len())?;
        }

        Ok(Self {
            id,
            user_id,
            scope,
            question_ids,
            seed,
            pass_threshold,
            status,
            created_at,
            ended_at,
            score,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn scope(&self) -> CategoryScope {
        self.scope
    }

    /// Question sequence, fixed at creation.
    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn pass_threshold(&self) -> u8 {
        self.pass_threshold
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session was completed or abandoned.
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn score(&self) -> Option<SessionScore> {
        self.score
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    #[must_use]
    pub fn contains(&self, question_id: QuestionId) -> bool {
        self.question_ids.contains(&question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.question_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.question_ids.is_empty()
    }

    /// Transition `active → completed` and record the final score.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotActive` for terminal sessions, or a
    /// range/time error when the inputs are inconsistent.
    pub fn complete(
        &mut self,
        at: DateTime<Utc>,
        score: SessionScore,
    ) -> Result<(), SessionStateError> {
        self.ensure_active()?;
        if at < self.created_at {
            return Err(SessionStateError::InvalidTimeRange);
        }
        check_score(score, self.question_ids.len())?;
        self.status = SessionStatus::Completed;
        self.ended_at = Some(at);
        self.score = Some(score);
        Ok(())
    }

    /// Transition `active → abandoned`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotActive` for terminal sessions.
    pub fn abandon(&mut self, at: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.ensure_active()?;
        if at < self.created_at {
            return Err(SessionStateError::InvalidTimeRange);
        }
        self.status = SessionStatus::Abandoned;
        self.ended_at = Some(at);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::NotActive` unless the session is active.
    pub fn ensure_active(&self) -> Result<(), SessionStateError> {
        if self.status.is_terminal() {
            return Err(SessionStateError::NotActive {
                status: self.status,
            });
        }
        Ok(())
    }
}

fn check_score(score: SessionScore, len: usize) -> Result<(), SessionStateError> {
    let fits = usize::try_from(score.total).is_ok_and(|total| total == len);
    if !fits || score.correct > score.total {
        return Err(SessionStateError::ScoreOutOfRange {
            correct: score.correct,
            total: score.total,
            len,
        });
    }
    Ok(())
}
