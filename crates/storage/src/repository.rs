use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerOption, Category, CategoryId, CategoryScope, NewSession, OptionId, Question, QuestionId,
    Session, SessionId, SessionScore, SessionStatus, StatsDelta, UserAnswer, UserId, UserStats,
    ValidatedQuestion, same_options,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Persist or update a category.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the category cannot be stored.
    async fn upsert_category(&self, category: &Category) -> Result<(), StorageError>;

    /// Fetch a category by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError>;

    /// All categories ordered by `(ordering, id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_categories(&self) -> Result<Vec<Category>, StorageError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist a question together with its full option set, replacing any
    /// previous options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the category does not exist, and
    /// `StorageError::Conflict` if a session already references the question
    /// and its category or options would change.
    async fn upsert_question(&self, question: &ValidatedQuestion) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;

    /// Candidate questions for a scope, ordered by category ordering, then
    /// category id, then question id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_questions(&self, scope: CategoryScope) -> Result<Vec<Question>, StorageError>;

    /// Options of a question ordered by `ordering`. Empty if the question
    /// has none or does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_options(&self, question_id: QuestionId)
    -> Result<Vec<AnswerOption>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_option(&self, id: OptionId) -> Result<Option<AnswerOption>, StorageError>;
}

//
// ─── SESSIONS ──────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a new active session and assign its id.
    ///
    /// With `exclusive` set, the insert only happens if the user has no other
    /// active session; the check and insert are one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when `exclusive` is set and an active
    /// session already exists.
    async fn create_session(
        &self,
        session: &NewSession,
        exclusive: bool,
    ) -> Result<Session, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// Sessions of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions(&self, user_id: UserId, limit: u32)
    -> Result<Vec<Session>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, StorageError>;

    /// Active sessions of any user created strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, StorageError>;

    /// Conditionally move `active → abandoned`.
    ///
    /// Returns `false` when the session was not active (already terminal or
    /// missing) and nothing changed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn abandon_session(&self, id: SessionId, at: DateTime<Utc>)
    -> Result<bool, StorageError>;

    /// Delete a session and, by cascade, its answers. Stats are untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Insert or overwrite the answer for `(session_id, question_id)`.
    ///
    /// Re-submitting the stored choice leaves the row untouched, so the
    /// returned row is identical for identical inputs.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session and
    /// `StorageError::Conflict` if the session is no longer active.
    async fn upsert_answer(&self, answer: &UserAnswer) -> Result<UserAnswer, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> Result<Option<UserAnswer>, StorageError>;

    /// Answers of a session ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_answers(&self, session_id: SessionId) -> Result<Vec<UserAnswer>, StorageError>;
}

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Fold deltas into the user's stats rows in one all-or-nothing step,
    /// creating missing rows.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on failure; no counter is changed in that case.
    async fn apply_deltas(
        &self,
        user_id: UserId,
        deltas: &[StatsDelta],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_stats(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Option<UserStats>, StorageError>;

    /// All stats rows of a user ordered by category id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_stats(&self, user_id: UserId) -> Result<Vec<UserStats>, StorageError>;

    /// Delete stats rows for one category, or all when `category_id` is `None`.
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn reset_stats(
        &self,
        user_id: UserId,
        category_id: Option<CategoryId>,
    ) -> Result<u64, StorageError>;
}

/// Completion as a single transaction: the session transition and the stats
/// increments either both happen or neither does.
#[async_trait]
pub trait CompletionPersistence: Send + Sync {
    /// Conditionally move `active → completed`, store `score`, and apply
    /// `deltas` to the session owner's stats.
    ///
    /// Returns `false` when the session was not active; nothing changes then.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on failure, with everything rolled back.
    async fn complete_session(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
        score: SessionScore,
        deltas: &[StatsDelta],
    ) -> Result<bool, StorageError>;
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write several options atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn set_settings(&self, options: &[(String, String)]) -> Result<(), StorageError>;

    /// All stored options ordered by key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_settings(&self) -> Result<Vec<(String, String)>, StorageError>;

    /// Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_setting(&self, key: &str) -> Result<bool, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    categories: HashMap<CategoryId, Category>,
    questions: HashMap<QuestionId, Question>,
    options: HashMap<QuestionId, Vec<AnswerOption>>,
    sessions: BTreeMap<SessionId, Session>,
    answers: BTreeMap<(SessionId, QuestionId), UserAnswer>,
    stats: BTreeMap<(UserId, CategoryId), UserStats>,
    settings: BTreeMap<String, String>,
    next_session_id: u64,
}

impl MemoryState {
    fn is_referenced(&self, question_id: QuestionId) -> bool {
        self.sessions.values().any(|s| s.contains(question_id))
    }

    fn apply_deltas(&mut self, user_id: UserId, deltas: &[StatsDelta], at: DateTime<Utc>) {
        for delta in deltas {
            self.stats
                .entry((user_id, delta.category_id))
                .or_insert_with(|| UserStats::empty(user_id, delta.category_id, at))
                .apply(delta, at);
        }
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All relations sit behind one mutex so multi-relation operations
/// (session creation, completion) are atomic exactly as in `SQLite`.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CategoryRepository for InMemoryRepository {
    async fn upsert_category(&self, category: &Category) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.categories.insert(category.id(), category.clone());
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<Category> = guard.categories.values().cloned().collect();
        out.sort_by_key(|c| (c.ordering(), c.id()));
        Ok(out)
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, validated: &ValidatedQuestion) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let question = &validated.question;
        if !guard.categories.contains_key(&question.category_id()) {
            return Err(StorageError::NotFound);
        }
        if let Some(existing) = guard.questions.get(&question.id()) {
            let unchanged = existing.category_id() == question.category_id()
                && guard
                    .options
                    .get(&question.id())
                    .is_some_and(|opts| same_options(opts, &validated.options));
            if !unchanged && guard.is_referenced(question.id()) {
                return Err(StorageError::Conflict);
            }
        }
        // option ids are global; refuse to steal one from another question
        let stolen = guard.options.iter().any(|(qid, opts)| {
            *qid != question.id()
                && opts
                    .iter()
                    .any(|o| validated.options.iter().any(|n| n.id == o.id))
        });
        if stolen {
            return Err(StorageError::Conflict);
        }

        let mut stored = question.clone();
        if let Some(existing) = guard.questions.get(&question.id()) {
            // keep created_at from the original insert
            stored = Question::from_persisted(
                question.id(),
                question.category_id(),
                question.prompt().to_owned(),
                question.explanation().map(ToOwned::to_owned),
                question.kind(),
                existing.created_at(),
            )
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        }
        guard.questions.insert(question.id(), stored);
        guard
            .options
            .insert(question.id(), validated.options.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.questions.get(&id).cloned())
    }

    async fn list_questions(&self, scope: CategoryScope) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<(i32, CategoryId, Question)> = guard
            .questions
            .values()
            .filter(|q| match scope {
                CategoryScope::Category(id) => q.category_id() == id,
                CategoryScope::Mixed => true,
            })
            .filter_map(|q| {
                guard
                    .categories
                    .get(&q.category_id())
                    .map(|c| (c.ordering(), c.id(), q.clone()))
            })
            .collect();
        out.sort_by_key(|(ordering, cat, q)| (*ordering, *cat, q.id()));
        Ok(out.into_iter().map(|(_, _, q)| q).collect())
    }

    async fn get_options(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerOption>, StorageError> {
        let guard = self.lock()?;
        let mut out = guard.options.get(&question_id).cloned().unwrap_or_default();
        out.sort_by_key(|o| (o.ordering, o.id));
        Ok(out)
    }

    async fn get_option(&self, id: OptionId) -> Result<Option<AnswerOption>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .options
            .values()
            .flatten()
            .find(|o| o.id == id)
            .cloned())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(
        &self,
        session: &NewSession,
        exclusive: bool,
    ) -> Result<Session, StorageError> {
        let mut guard = self.lock()?;
        if exclusive
            && guard
                .sessions
                .values()
                .any(|s| s.user_id() == session.user_id && s.is_active())
        {
            return Err(StorageError::Conflict);
        }
        if session
            .question_ids
            .iter()
            .any(|id| !guard.questions.contains_key(id))
        {
            return Err(StorageError::NotFound);
        }
        guard.next_session_id += 1;
        let stored = session.clone().assign_id(SessionId::new(guard.next_session_id));
        guard.sessions.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.sessions.get(&id).cloned())
    }

    async fn list_sessions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut out: Vec<Session> = guard
            .sessions
            .values()
            .filter(|s| s.user_id() == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        out.truncate(limit);
        Ok(out)
    }

    async fn active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .sessions
            .values()
            .filter(|s| s.user_id() == user_id && s.is_active())
            .cloned()
            .collect())
    }

    async fn stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .sessions
            .values()
            .filter(|s| s.is_active() && s.created_at() < cutoff)
            .cloned()
            .collect())
    }

    async fn abandon_session(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        match guard.sessions.get_mut(&id) {
            Some(session) if session.is_active() => {
                session
                    .abandon(at)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.sessions.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        guard.answers.retain(|(sid, _), _| *sid != id);
        Ok(())
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn upsert_answer(&self, answer: &UserAnswer) -> Result<UserAnswer, StorageError> {
        let mut guard = self.lock()?;
        let session = guard
            .sessions
            .get(&answer.session_id)
            .ok_or(StorageError::NotFound)?;
        if !session.is_active() {
            return Err(StorageError::Conflict);
        }
        let key = (answer.session_id, answer.question_id);
        if let Some(existing) = guard.answers.get(&key) {
            if existing.same_choice(answer) {
                return Ok(existing.clone());
            }
        }
        guard.answers.insert(key, answer.clone());
        Ok(answer.clone())
    }

    async fn get_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> Result<Option<UserAnswer>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.answers.get(&(session_id, question_id)).cloned())
    }

    async fn list_answers(&self, session_id: SessionId) -> Result<Vec<UserAnswer>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .answers
            .range((session_id, QuestionId::new(0))..=(session_id, QuestionId::new(u64::MAX)))
            .map(|(_, a)| a.clone())
            .collect())
    }
}

#[async_trait]
impl StatsRepository for InMemoryRepository {
    async fn apply_deltas(
        &self,
        user_id: UserId,
        deltas: &[StatsDelta],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.apply_deltas(user_id, deltas, at);
        Ok(())
    }

    async fn get_stats(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Option<UserStats>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.stats.get(&(user_id, category_id)).cloned())
    }

    async fn list_stats(&self, user_id: UserId) -> Result<Vec<UserStats>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .stats
            .values()
            .filter(|s| s.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn reset_stats(
        &self,
        user_id: UserId,
        category_id: Option<CategoryId>,
    ) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let before = guard.stats.len();
        guard.stats.retain(|(user, cat), _| {
            *user != user_id || category_id.is_some_and(|wanted| wanted != *cat)
        });
        Ok(u64::try_from(before - guard.stats.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl CompletionPersistence for InMemoryRepository {
    async fn complete_session(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
        score: SessionScore,
        deltas: &[StatsDelta],
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let Some(session) = guard.sessions.get(&id) else {
            return Ok(false);
        };
        if session.status() != SessionStatus::Active {
            return Ok(false);
        }
        // validate on a copy so a bad score leaves the session untouched
        let mut updated = session.clone();
        updated
            .complete(at, score)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let user_id = updated.user_id();
        guard.sessions.insert(id, updated);
        guard.apply_deltas(user_id, deltas, at);
        Ok(true)
    }
}

#[async_trait]
impl SettingsRepository for InMemoryRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.settings.get(key).cloned())
    }

    async fn set_settings(&self, options: &[(String, String)]) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        for (key, value) in options {
            guard.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn list_settings(&self) -> Result<Vec<(String, String)>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .settings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete_setting(&self, key: &str) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        Ok(guard.settings.remove(key).is_some())
    }
}

/// Aggregates all repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub categories: Arc<dyn CategoryRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub stats: Arc<dyn StatsRepository>,
    pub completion: Arc<dyn CompletionPersistence>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }

    /// Wire every port to the same backend.
    #[must_use]
    pub fn from_backend<R>(repo: R) -> Self
    where
        R: CategoryRepository
            + QuestionRepository
            + SessionRepository
            + AnswerRepository
            + StatsRepository
            + CompletionPersistence
            + SettingsRepository
            + Clone
            + 'static,
    {
        Self {
            categories: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            stats: Arc::new(repo.clone()),
            completion: Arc::new(repo.clone()),
            settings: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{OptionDraft, QuestionDraft, QuestionKind};
    use quiz_core::time::fixed_now;

    fn category(id: u64, ordering: i32) -> Category {
        Category::new(CategoryId::new(id), format!("Category {id}"), None, ordering).unwrap()
    }

    fn question(id: u64, category: u64) -> ValidatedQuestion {
        QuestionDraft {
            id: QuestionId::new(id),
            category_id: CategoryId::new(category),
            prompt: format!("Q{id}"),
            explanation: None,
            kind: QuestionKind::SingleChoice,
            options: vec![
                OptionDraft::new(OptionId::new(id * 10), "right", true),
                OptionDraft::new(OptionId::new(id * 10 + 1), "wrong", false),
            ],
        }
        .validate(fixed_now())
        .unwrap()
    }

    fn new_session(user: u64, questions: &[u64]) -> NewSession {
        NewSession::new(
            UserId::new(user),
            CategoryScope::Mixed,
            questions.iter().copied().map(QuestionId::new).collect(),
            7,
            70,
            fixed_now(),
        )
        .unwrap()
    }

    async fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.upsert_category(&category(1, 2)).await.unwrap();
        repo.upsert_category(&category(2, 1)).await.unwrap();
        repo.upsert_question(&question(1, 1)).await.unwrap();
        repo.upsert_question(&question(2, 2)).await.unwrap();
        repo.upsert_question(&question(3, 1)).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn mixed_listing_follows_category_ordering() {
        let repo = seeded().await;
        let ids: Vec<u64> = repo
            .list_questions(CategoryScope::Mixed)
            .await
            .unwrap()
            .iter()
            .map(|q| q.id().value())
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);

        let only_first = repo
            .list_questions(CategoryScope::Category(CategoryId::new(1)))
            .await
            .unwrap();
        assert_eq!(only_first.len(), 2);
    }

    #[tokio::test]
    async fn question_requires_existing_category() {
        let repo = InMemoryRepository::new();
        let err = repo.upsert_question(&question(1, 9)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn referenced_question_options_are_frozen() {
        let repo = seeded().await;
        repo.create_session(&new_session(1, &[1]), true).await.unwrap();

        let mut changed = question(1, 1);
        changed.options[0].is_correct = false;
        changed.options[1].is_correct = true;
        let err = repo.upsert_question(&changed).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // unchanged options are still accepted (prompt edits)
        repo.upsert_question(&question(1, 1)).await.unwrap();
    }

    #[tokio::test]
    async fn exclusive_create_conflicts_on_active_session() {
        let repo = seeded().await;
        let first = repo.create_session(&new_session(1, &[1]), true).await.unwrap();
        let err = repo
            .create_session(&new_session(1, &[2]), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // other users and non-exclusive creates are unaffected
        repo.create_session(&new_session(2, &[1]), true).await.unwrap();
        repo.create_session(&new_session(1, &[2]), false).await.unwrap();

        let active = repo.active_sessions(UserId::new(1)).await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().any(|s| s.id() == first.id()));
    }

    #[tokio::test]
    async fn completion_is_conditional_and_applies_stats_once() {
        let repo = seeded().await;
        let session = repo.create_session(&new_session(1, &[1, 3]), true).await.unwrap();
        let score = SessionScore { correct: 1, total: 2 };
        let deltas = [StatsDelta {
            category_id: CategoryId::new(1),
            attempted: 2,
            correct: 1,
            sessions: 1,
        }];

        assert!(repo
            .complete_session(session.id(), fixed_now(), score, &deltas)
            .await
            .unwrap());
        assert!(!repo
            .complete_session(session.id(), fixed_now(), score, &deltas)
            .await
            .unwrap());

        let stats = repo
            .get_stats(UserId::new(1), CategoryId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.attempted(), 2);
        assert_eq!(stats.total_sessions(), 1);
    }

    #[tokio::test]
    async fn answers_are_idempotent_and_cascade_on_delete() {
        let repo = seeded().await;
        let session = repo.create_session(&new_session(1, &[1]), true).await.unwrap();
        let first = UserAnswer::new(
            session.id(),
            QuestionId::new(1),
            Some(OptionId::new(10)),
            true,
            fixed_now(),
        );
        let stored = repo.upsert_answer(&first).await.unwrap();

        let mut again = first.clone();
        again.answered_at = fixed_now() + chrono::Duration::seconds(5);
        assert_eq!(repo.upsert_answer(&again).await.unwrap(), stored);

        repo.delete_session(session.id()).await.unwrap();
        assert!(repo.list_answers(session.id()).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_session(session.id()).await.unwrap_err(),
            StorageError::NotFound
        ));
    }

    #[tokio::test]
    async fn reset_stats_scopes_to_category() {
        let repo = seeded().await;
        let deltas = [
            StatsDelta {
                category_id: CategoryId::new(1),
                attempted: 1,
                correct: 1,
                sessions: 1,
            },
            StatsDelta {
                category_id: CategoryId::new(2),
                attempted: 1,
                correct: 0,
                sessions: 1,
            },
        ];
        repo.apply_deltas(UserId::new(1), &deltas, fixed_now()).await.unwrap();
        repo.apply_deltas(UserId::new(2), &deltas, fixed_now()).await.unwrap();

        let removed = repo
            .reset_stats(UserId::new(1), Some(CategoryId::new(1)))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.list_stats(UserId::new(1)).await.unwrap().len(), 1);
        assert_eq!(repo.reset_stats(UserId::new(2), None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn option_lookup_and_settings_share_one_backend() {
        let repo = seeded().await;
        repo.set_settings(&[("pass_threshold".into(), "80".into())])
            .await
            .unwrap();

        let option = repo.get_option(OptionId::new(20)).await.unwrap().unwrap();
        assert_eq!(option.question_id, QuestionId::new(2));
        assert!(option.is_correct);
        assert_eq!(
            repo.get_setting("pass_threshold").await.unwrap().as_deref(),
            Some("80")
        );
        assert_eq!(repo.list_settings().await.unwrap().len(), 1);
        assert!(repo.delete_setting("pass_threshold").await.unwrap());
        assert!(repo.get_setting("pass_threshold").await.unwrap().is_none());
    }
}
