use quiz_core::model::{Session, SessionStatus, UserAnswer};
use serde::Serialize;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    /// Questions with a selected option.
    pub answered: usize,
    /// Questions explicitly skipped.
    pub skipped: usize,
    pub remaining: usize,
    pub status: SessionStatus,
}

impl SessionProgress {
    /// Count progress from a session and its stored answers.
    ///
    /// Answers for questions outside the sequence are ignored.
    #[must_use]
    pub fn from_answers(session: &Session, answers: &[UserAnswer]) -> Self {
        let in_sequence = answers
            .iter()
            .filter(|a| a.session_id == session.id() && session.contains(a.question_id));
        let (answered, skipped) = in_sequence.fold((0_usize, 0_usize), |(answered, skipped), a| {
            if a.selected_option_id.is_some() {
                (answered + 1, skipped)
            } else {
                (answered, skipped + 1)
            }
        });
        let total = session.len();
        Self {
            total,
            answered,
            skipped,
            remaining: total.saturating_sub(answered + skipped),
            status: session.status(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{CategoryScope, NewSession, OptionId, QuestionId, SessionId, UserId};
    use quiz_core::time::fixed_now;

    #[test]
    fn counts_answers_and_skips() {
        let session = NewSession::new(
            UserId::new(1),
            CategoryScope::Mixed,
            vec![QuestionId::new(1), QuestionId::new(2), QuestionId::new(3)],
            0,
            70,
            fixed_now(),
        )
        .unwrap()
        .assign_id(SessionId::new(1));
        let answer = |q: u64, opt: Option<u64>| {
            UserAnswer::new(
                SessionId::new(1),
                QuestionId::new(q),
                opt.map(OptionId::new),
                false,
                fixed_now(),
            )
        };

        let progress =
            SessionProgress::from_answers(&session, &[answer(1, Some(10)), answer(2, None)]);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.skipped, 1);
        assert_eq!(progress.remaining, 1);
        assert!(!progress.is_complete());
    }
}
