//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{
    CategoryError, CategoryId, OptionId, QuestionError, QuestionId, SessionId, SessionStateError,
    SessionStatus, SettingsError, UserId,
};
use quiz_core::scoring::ScoringError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification hosts map to responses (HTTP status, CLI exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    NotInSession,
    InvalidOption,
    InsufficientContent,
    Validation,
    Internal,
}

/// Common surface of every service error.
pub trait ServiceError: std::error::Error {
    fn kind(&self) -> ErrorKind;

    /// Message safe to show to end users. Storage details never leak here.
    fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_owned(),
            _ => self.to_string(),
        }
    }
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound => ErrorKind::NotFound,
        StorageError::Conflict => ErrorKind::Conflict,
        _ => ErrorKind::Internal,
    }
}

/// Errors emitted by `ContentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),
    #[error("question {0} not found")]
    QuestionNotFound(QuestionId),
    #[error("question {0} has no correct option configured")]
    NoCorrectOption(QuestionId),
    #[error("question {0} is used by a session and cannot change")]
    QuestionInUse(QuestionId),
    #[error("not enough questions: {available} available, {requested} requested")]
    NotEnoughQuestions { available: usize, requested: usize },
    #[error("question count must be > 0")]
    InvalidCount,
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError for ContentError {
    fn kind(&self) -> ErrorKind {
        match self {
            ContentError::CategoryNotFound(_)
            | ContentError::QuestionNotFound(_)
            | ContentError::NoCorrectOption(_) => ErrorKind::NotFound,
            ContentError::QuestionInUse(_) => ErrorKind::Conflict,
            ContentError::NotEnoughQuestions { .. } => ErrorKind::InsufficientContent,
            ContentError::InvalidCount
            | ContentError::Category(_)
            | ContentError::Question(_) => ErrorKind::Validation,
            ContentError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `SettingsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsServiceError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError for SettingsServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            SettingsServiceError::Settings(_) => ErrorKind::Validation,
            SettingsServiceError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `ScoringService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScoringServiceError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError for ScoringServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            ScoringServiceError::SessionNotFound(_) => ErrorKind::NotFound,
            ScoringServiceError::Content(e) => e.kind(),
            // a sequence the key cannot cover is an integrity failure
            ScoringServiceError::Scoring(_) => ErrorKind::Internal,
            ScoringServiceError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `StatsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatsServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError for StatsServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            StatsServiceError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `SessionManager`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("user {user_id} already has an active session")]
    Conflict { user_id: UserId },
    #[error("session is {status}")]
    InvalidState { status: SessionStatus },
    #[error("question {question_id} is not part of this session")]
    NotInSession { question_id: QuestionId },
    #[error("option {option_id} does not belong to question {question_id}")]
    InvalidOption {
        option_id: OptionId,
        question_id: QuestionId,
    },
    #[error("not enough questions: {available} available, {requested} requested")]
    InsufficientContent { available: usize, requested: usize },
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Content(ContentError),
    #[error(transparent)]
    Settings(#[from] SettingsServiceError),
    #[error(transparent)]
    Scoring(#[from] ScoringServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ContentError> for SessionError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotEnoughQuestions {
                available,
                requested,
            } => SessionError::InsufficientContent {
                available,
                requested,
            },
            other => SessionError::Content(other),
        }
    }
}

impl ServiceError for SessionError {
    fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Conflict { .. } => ErrorKind::Conflict,
            SessionError::InvalidState { .. } => ErrorKind::InvalidState,
            SessionError::NotInSession { .. } => ErrorKind::NotInSession,
            SessionError::InvalidOption { .. } => ErrorKind::InvalidOption,
            SessionError::InsufficientContent { .. } => ErrorKind::InsufficientContent,
            SessionError::State(SessionStateError::NotActive { .. }) => ErrorKind::InvalidState,
            SessionError::State(_) => ErrorKind::Validation,
            SessionError::Content(e) => e.kind(),
            SessionError::Settings(e) => e.kind(),
            SessionError::Scoring(e) => e.kind(),
            SessionError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
