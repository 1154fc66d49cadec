use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{OptionId, QuestionId, SessionId};

/// A user's answer to one question of a session.
///
/// There is at most one row per `(session_id, question_id)`; answering again
/// replaces it. `selected_option_id == None` records an explicit skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAnswer {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub selected_option_id: Option<OptionId>,
    /// Cached at submit time from the option's correct flag.
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl UserAnswer {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        question_id: QuestionId,
        selected_option_id: Option<OptionId>,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            question_id,
            selected_option_id,
            // a skipped question can never be correct
            is_correct: is_correct && selected_option_id.is_some(),
            answered_at,
        }
    }

    /// True when `other` would store the same choice for the same question.
    #[must_use]
    pub fn same_choice(&self, other: &UserAnswer) -> bool {
        self.session_id == other.session_id
            && self.question_id == other.question_id
            && self.selected_option_id == other.selected_option_id
    }
}
