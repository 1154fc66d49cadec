use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CategoryId, OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question needs at least {min} options, got {got}")]
    TooFewOptions { min: usize, got: usize },

    #[error("question has no option flagged correct")]
    NoCorrectOption,

    #[error("single-choice question has {count} options flagged correct")]
    MultipleCorrectOptions { count: usize },

    #[error("option {0} appears more than once")]
    DuplicateOption(OptionId),

    #[error("option {0} has empty text")]
    EmptyOptionText(OptionId),

    #[error("unknown question type: {0}")]
    UnknownKind(String),
}

//
// ─── QUESTION TYPE ─────────────────────────────────────────────────────────────
//

/// Supported question types. Only single choice is graded today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    #[default]
    SingleChoice,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(QuestionKind::SingleChoice),
            other => Err(QuestionError::UnknownKind(other.to_owned())),
        }
    }
}

//
// ─── DRAFTS ────────────────────────────────────────────────────────────────────
//

/// Authoring input for one answer option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDraft {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

impl OptionDraft {
    #[must_use]
    pub fn new(id: OptionId, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id,
            text: text.into(),
            is_correct,
        }
    }
}

/// Authoring input for a question together with its options.
///
/// Integrity rules are enforced here, at authoring time, so grading never
/// meets a question it cannot score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub category_id: CategoryId,
    pub prompt: String,
    pub explanation: Option<String>,
    pub kind: QuestionKind,
    pub options: Vec<OptionDraft>,
}

impl QuestionDraft {
    pub const MIN_OPTIONS: usize = 2;

    /// Validate the draft into a question and its ordered options.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when the prompt is blank, options are missing,
    /// duplicated or blank, or the number of correct options is not exactly one.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedQuestion, QuestionError> {
        let prompt = self.prompt.trim().to_owned();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if self.options.len() < Self::MIN_OPTIONS {
            return Err(QuestionError::TooFewOptions {
                min: Self::MIN_OPTIONS,
                got: self.options.len(),
            });
        }

        let mut seen = HashSet::with_capacity(self.options.len());
        let mut options = Vec::with_capacity(self.options.len());
        for (ordering, draft) in self.options.into_iter().enumerate() {
            if !seen.insert(draft.id) {
                return Err(QuestionError::DuplicateOption(draft.id));
            }
            let text = draft.text.trim().to_owned();
            if text.is_empty() {
                return Err(QuestionError::EmptyOptionText(draft.id));
            }
            options.push(AnswerOption {
                id: draft.id,
                question_id: self.id,
                text,
                is_correct: draft.is_correct,
                ordering: u32::try_from(ordering).unwrap_or(u32::MAX),
            });
        }
        check_correct_count(self.kind, &options)?;

        let question = Question {
            id: self.id,
            category_id: self.category_id,
            prompt,
            explanation: self
                .explanation
                .map(|e| e.trim().to_owned())
                .filter(|e| !e.is_empty()),
            kind: self.kind,
            created_at: now,
        };

        Ok(ValidatedQuestion { question, options })
    }
}

fn check_correct_count(kind: QuestionKind, options: &[AnswerOption]) -> Result<(), QuestionError> {
    let count = options.iter().filter(|o| o.is_correct).count();
    match (kind, count) {
        (_, 0) => Err(QuestionError::NoCorrectOption),
        (QuestionKind::SingleChoice, 1) => Ok(()),
        (QuestionKind::SingleChoice, count) => Err(QuestionError::MultipleCorrectOptions { count }),
    }
}

/// Output of `QuestionDraft::validate`, ready to be stored as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuestion {
    pub question: Question,
    pub options: Vec<AnswerOption>,
}

impl ValidatedQuestion {
    /// The single correct option of this question.
    #[must_use]
    pub fn correct_option(&self) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.is_correct)
    }
}

//
// ─── ENTITIES ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    category_id: CategoryId,
    prompt: String,
    explanation: Option<String>,
    kind: QuestionKind,
    created_at: DateTime<Utc>,
}

impl Question {
    /// Rehydrate a question from storage.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` if the stored prompt is blank.
    pub fn from_persisted(
        id: QuestionId,
        category_id: CategoryId,
        prompt: String,
        explanation: Option<String>,
        kind: QuestionKind,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        Ok(Self {
            id,
            category_id,
            prompt,
            explanation,
            kind,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One selectable answer for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub question_id: QuestionId,
    pub text: String,
    pub is_correct: bool,
    pub ordering: u32,
}

/// Returns true when two option sets are identical for grading purposes.
///
/// Ordering and text are compared too, since a referenced question must not
/// change under a running session.
#[must_use]
pub fn same_options(a: &[AnswerOption], b: &[AnswerOption]) -> bool {
    let mut a: Vec<_> = a.iter().collect();
    let mut b: Vec<_> = b.iter().collect();
    a.sort_by_key(|o| o.id);
    b.sort_by_key(|o| o.id);
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft(options: Vec<OptionDraft>) -> QuestionDraft {
        QuestionDraft {
            id: QuestionId::new(1),
            category_id: CategoryId::new(1),
            prompt: "What is 2 + 2?".into(),
            explanation: Some("  Add the numbers.  ".into()),
            kind: QuestionKind::SingleChoice,
            options,
        }
    }

    #[test]
    fn validates_single_choice_question() {
        let validated = draft(vec![
            OptionDraft::new(OptionId::new(10), "3", false),
            OptionDraft::new(OptionId::new(11), "4", true),
        ])
        .validate(fixed_now())
        .unwrap();

        assert_eq!(validated.question.explanation(), Some("Add the numbers."));
        assert_eq!(validated.options.len(), 2);
        assert_eq!(validated.options[1].ordering, 1);
        assert_eq!(validated.options[1].question_id, QuestionId::new(1));
        assert_eq!(validated.correct_option().unwrap().id, OptionId::new(11));
    }

    #[test]
    fn rejects_question_without_correct_option() {
        let err = draft(vec![
            OptionDraft::new(OptionId::new(10), "3", false),
            OptionDraft::new(OptionId::new(11), "5", false),
        ])
        .validate(fixed_now())
        .unwrap_err();
        assert_eq!(err, QuestionError::NoCorrectOption);
    }

    #[test]
    fn rejects_two_correct_options() {
        let err = draft(vec![
            OptionDraft::new(OptionId::new(10), "4", true),
            OptionDraft::new(OptionId::new(11), "four", true),
        ])
        .validate(fixed_now())
        .unwrap_err();
        assert_eq!(err, QuestionError::MultipleCorrectOptions { count: 2 });
    }

    #[test]
    fn rejects_duplicate_and_blank_options() {
        let dup = draft(vec![
            OptionDraft::new(OptionId::new(10), "4", true),
            OptionDraft::new(OptionId::new(10), "5", false),
        ])
        .validate(fixed_now())
        .unwrap_err();
        assert_eq!(dup, QuestionError::DuplicateOption(OptionId::new(10)));

        let blank = draft(vec![
            OptionDraft::new(OptionId::new(10), "4", true),
            OptionDraft::new(OptionId::new(11), "  ", false),
        ])
        .validate(fixed_now())
        .unwrap_err();
        assert_eq!(blank, QuestionError::EmptyOptionText(OptionId::new(11)));
    }

    #[test]
    fn rejects_single_option() {
        let err = draft(vec![OptionDraft::new(OptionId::new(10), "4", true)])
            .validate(fixed_now())
            .unwrap_err();
        assert_eq!(err, QuestionError::TooFewOptions { min: 2, got: 1 });
    }

    #[test]
    fn kind_round_trips_through_str() {
        let kind: QuestionKind = QuestionKind::SingleChoice.as_str().parse().unwrap();
        assert_eq!(kind, QuestionKind::SingleChoice);
        assert!("essay".parse::<QuestionKind>().is_err());
    }

    #[test]
    fn same_options_ignores_slice_order() {
        let v = draft(vec![
            OptionDraft::new(OptionId::new(10), "3", false),
            OptionDraft::new(OptionId::new(11), "4", true),
        ])
        .validate(fixed_now())
        .unwrap();
        let mut reversed = v.options.clone();
        reversed.reverse();
        assert!(same_options(&v.options, &reversed));

        let mut changed = v.options.clone();
        changed[0].is_correct = true;
        changed[1].is_correct = false;
        assert!(!same_options(&v.options, &changed));
    }
}
