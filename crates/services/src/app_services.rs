use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::content_service::ContentService;
use crate::error::AppServicesError;
use crate::events::{NoopEventSink, QuizEventSink};
use crate::scoring_service::ScoringService;
use crate::sessions::SessionManager;
use crate::settings_service::SettingsService;
use crate::stats_service::StatsService;

/// Composition root: wires every service to one `Storage`.
#[derive(Clone)]
pub struct QuizServices {
    content: Arc<ContentService>,
    sessions: Arc<SessionManager>,
    scoring: Arc<ScoringService>,
    stats: Arc<StatsService>,
    settings: Arc<SettingsService>,
}

impl QuizServices {
    /// Build services over an existing storage with a no-op event sink.
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock) -> Self {
        Self::with_events(storage, clock, Arc::new(NoopEventSink))
    }

    #[must_use]
    pub fn with_events(storage: &Storage, clock: Clock, events: Arc<dyn QuizEventSink>) -> Self {
        let content = Arc::new(ContentService::new(
            clock,
            Arc::clone(&storage.categories),
            Arc::clone(&storage.questions),
        ));
        let settings = Arc::new(SettingsService::new(Arc::clone(&storage.settings)));
        let scoring = Arc::new(ScoringService::new(
            Arc::clone(&content),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.answers),
        ));
        let stats = Arc::new(StatsService::new(clock, Arc::clone(&storage.stats)));
        let sessions = Arc::new(SessionManager::new(
            clock,
            Arc::clone(&content),
            Arc::clone(&settings),
            Arc::clone(&scoring),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.answers),
            Arc::clone(&storage.completion),
            events,
        ));

        Self {
            content,
            sessions,
            scoring,
            stats,
            settings,
        }
    }

    /// Services backed by in-memory storage, for tests and prototypes.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(&Storage::in_memory(), clock)
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, clock))
    }

    #[must_use]
    pub fn content(&self) -> Arc<ContentService> {
        Arc::clone(&self.content)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn scoring(&self) -> Arc<ScoringService> {
        Arc::clone(&self.scoring)
    }

    #[must_use]
    pub fn stats(&self) -> Arc<StatsService> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings)
    }
}
