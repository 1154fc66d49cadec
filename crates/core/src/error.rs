use thiserror::Error;

use crate::model::{CategoryError, QuestionError, SessionStateError, SettingsError, StatsError};
use crate::scoring::ScoringError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}
