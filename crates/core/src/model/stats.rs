use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CategoryId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StatsError {
    #[error("correct ({correct}) exceeds attempted ({attempted})")]
    CorrectExceedsAttempted { correct: u64, attempted: u64 },
}

/// Increment applied to one `(user, category)` row when a session completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub category_id: CategoryId,
    pub attempted: u32,
    pub correct: u32,
    pub sessions: u32,
}

/// Cumulative per-user, per-category counters across completed sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    user_id: UserId,
    category_id: CategoryId,
    attempted: u64,
    correct: u64,
    total_sessions: u64,
    last_updated: DateTime<Utc>,
}

impl UserStats {
    /// Fresh zeroed row, as created on a user's first completed session.
    #[must_use]
    pub fn empty(user_id: UserId, category_id: CategoryId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            category_id,
            attempted: 0,
            correct: 0,
            total_sessions: 0,
            last_updated: at,
        }
    }

    /// Rehydrate from storage.
    ///
    /// # Errors
    ///
    /// Returns `StatsError` if the counters are inconsistent.
    pub fn from_persisted(
        user_id: UserId,
        category_id: CategoryId,
        attempted: u64,
        correct: u64,
        total_sessions: u64,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, StatsError> {
        if correct > attempted {
            return Err(StatsError::CorrectExceedsAttempted { correct, attempted });
        }
        Ok(Self {
            user_id,
            category_id,
            attempted,
            correct,
            total_sessions,
            last_updated,
        })
    }

    /// Fold one delta in. Counters only ever grow here.
    pub fn apply(&mut self, delta: &StatsDelta, at: DateTime<Utc>) {
        self.attempted = self.attempted.saturating_add(u64::from(delta.attempted));
        self.correct = self.correct.saturating_add(u64::from(delta.correct));
        self.total_sessions = self.total_sessions.saturating_add(u64::from(delta.sessions));
        self.last_updated = at;
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    #[must_use]
    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    #[must_use]
    pub fn correct(&self) -> u64 {
        self.correct
    }

    #[must_use]
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Share of attempted questions answered correctly, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.correct as f64 * 100.0 / self.attempted as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn apply_accumulates() {
        let mut stats = UserStats::empty(UserId::new(1), CategoryId::new(2), fixed_now());
        let delta = StatsDelta {
            category_id: CategoryId::new(2),
            attempted: 5,
            correct: 3,
            sessions: 1,
        };
        stats.apply(&delta, fixed_now());
        stats.apply(&delta, fixed_now());
        assert_eq!(stats.attempted(), 10);
        assert_eq!(stats.correct(), 6);
        assert_eq!(stats.total_sessions(), 2);
        assert!((stats.accuracy() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn persisted_rejects_impossible_counts() {
        let err = UserStats::from_persisted(UserId::new(1), CategoryId::new(2), 1, 2, 1, fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            StatsError::CorrectExceedsAttempted {
                correct: 2,
                attempted: 1
            }
        );
    }
}
