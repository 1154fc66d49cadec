//! Pure grading of a session against an answer key.
//!
//! Grading is all-or-nothing per question: an answer is correct only when
//! the selected option is the question's single correct option.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::model::{
    AnswerOption, CategoryId, OptionId, QuestionId, Session, SessionScore, StatsDelta, UserAnswer,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoringError {
    #[error("no answer key for question {0}")]
    MissingAnswerKey(QuestionId),

    #[error("question {0} has no correct option configured")]
    NoCorrectOption(QuestionId),

    #[error("too many questions to score: {0}")]
    TooManyQuestions(usize),
}

/// Correct option and category for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    pub category_id: CategoryId,
    pub correct_option_id: OptionId,
}

/// Lookup from question to its correct option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerKey {
    entries: HashMap<QuestionId, KeyEntry>,
}

impl AnswerKey {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question from its stored options.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::NoCorrectOption` when none of `options` is
    /// flagged correct. Grading must not guess in that case.
    pub fn insert_question(
        &mut self,
        question_id: QuestionId,
        category_id: CategoryId,
        options: &[AnswerOption],
    ) -> Result<(), ScoringError> {
        let correct = options
            .iter()
            .find(|o| o.is_correct && o.question_id == question_id)
            .ok_or(ScoringError::NoCorrectOption(question_id))?;
        self.entries.insert(
            question_id,
            KeyEntry {
                category_id,
                correct_option_id: correct.id,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&KeyEntry> {
        self.entries.get(&question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Grading result for a single question of the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub category_id: CategoryId,
    pub selected_option_id: Option<OptionId>,
    pub correct_option_id: OptionId,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub total: u32,
    pub correct: u32,
    pub percentage: f64,
    pub passed: bool,
    /// One entry per question, in session order.
    pub per_question_breakdown: Vec<QuestionResult>,
}

impl ScoreReport {
    #[must_use]
    pub fn score(&self) -> SessionScore {
        SessionScore {
            correct: self.correct,
            total: self.total,
        }
    }

    #[must_use]
    pub fn answered(&self) -> usize {
        self.per_question_breakdown
            .iter()
            .filter(|r| r.selected_option_id.is_some())
            .count()
    }

    /// Per-category increments for the stats relation, ordered by category.
    ///
    /// Each category touched by the report counts the session once.
    #[must_use]
    pub fn stats_deltas(&self) -> Vec<StatsDelta> {
        let mut by_category: BTreeMap<CategoryId, StatsDelta> = BTreeMap::new();
        for result in &self.per_question_breakdown {
            let delta = by_category
                .entry(result.category_id)
                .or_insert(StatsDelta {
                    category_id: result.category_id,
                    attempted: 0,
                    correct: 0,
                    sessions: 1,
                });
            delta.attempted += 1;
            if result.is_correct {
                delta.correct += 1;
            }
        }
        by_category.into_values().collect()
    }
}

/// Grade `session` from its stored answers.
///
/// Unanswered questions count as incorrect. Answers for questions outside the
/// session's sequence are ignored.
///
/// # Errors
///
/// Returns `ScoringError::MissingAnswerKey` if any question of the sequence is
/// absent from `key`.
pub fn grade(
    session: &Session,
    answers: &[UserAnswer],
    key: &AnswerKey,
) -> Result<ScoreReport, ScoringError> {
    let by_question: HashMap<QuestionId, &UserAnswer> = answers
        .iter()
        .filter(|a| a.session_id == session.id())
        .map(|a| (a.question_id, a))
        .collect();

    let mut breakdown = Vec::with_capacity(session.len());
    let mut correct = 0_u32;
    for question_id in session.question_ids() {
        let entry = key
            .get(*question_id)
            .ok_or(ScoringError::MissingAnswerKey(*question_id))?;
        let selected = by_question
            .get(question_id)
            .and_then(|a| a.selected_option_id);
        let is_correct = selected == Some(entry.correct_option_id);
        if is_correct {
            correct += 1;
        }
        breakdown.push(QuestionResult {
            question_id: *question_id,
            category_id: entry.category_id,
            selected_option_id: selected,
            correct_option_id: entry.correct_option_id,
            is_correct,
        });
    }

    let total = u32::try_from(breakdown.len())
        .map_err(|_| ScoringError::TooManyQuestions(breakdown.len()))?;
    let percentage = SessionScore { correct, total }.percentage();

    Ok(ScoreReport {
        total,
        correct,
        percentage,
        passed: percentage >= f64::from(session.pass_threshold()),
        per_question_breakdown: breakdown,
    })
}
