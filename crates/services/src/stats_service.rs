use std::sync::Arc;

use quiz_core::model::{CategoryId, UserId, UserStats};
use quiz_core::scoring::ScoreReport;
use storage::repository::StatsRepository;

use crate::Clock;
use crate::error::StatsServiceError;

/// Per-user, per-category aggregates.
///
/// Session completion folds stats through the completion transaction;
/// `update_stats` is for hosts that grade outside a session lifecycle.
#[derive(Clone)]
pub struct StatsService {
    clock: Clock,
    stats: Arc<dyn StatsRepository>,
}

impl StatsService {
    #[must_use]
    pub fn new(clock: Clock, stats: Arc<dyn StatsRepository>) -> Self {
        Self { clock, stats }
    }

    /// Fold a report into the user's stats, one increment per category.
    ///
    /// # Errors
    ///
    /// Returns `StatsServiceError` on failure; no row changes in that case.
    pub async fn update_stats(
        &self,
        user_id: UserId,
        report: &ScoreReport,
    ) -> Result<(), StatsServiceError> {
        let deltas = report.stats_deltas();
        self.stats
            .apply_deltas(user_id, &deltas, self.clock.now())
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StatsServiceError` on storage failures.
    pub async fn get_stats(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Option<UserStats>, StatsServiceError> {
        Ok(self.stats.get_stats(user_id, category_id).await?)
    }

    /// # Errors
    ///
    /// Returns `StatsServiceError` on storage failures.
    pub async fn list_stats(&self, user_id: UserId) -> Result<Vec<UserStats>, StatsServiceError> {
        Ok(self.stats.list_stats(user_id).await?)
    }

    /// Clear one category or, with `None`, every category for the user.
    ///
    /// # Errors
    ///
    /// Returns `StatsServiceError` on storage failures.
    pub async fn reset_stats(
        &self,
        user_id: UserId,
        category_id: Option<CategoryId>,
    ) -> Result<u64, StatsServiceError> {
        let removed = self.stats.reset_stats(user_id, category_id).await?;
        tracing::info!(%user_id, ?category_id, removed, "stats reset");
        Ok(removed)
    }
}
