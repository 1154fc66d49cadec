use std::sync::Arc;

use quiz_core::model::{QuizSettings, SettingsError};
use storage::repository::SettingsRepository;

use crate::error::SettingsServiceError;

/// Flat key-value settings with a typed view for the engine.
#[derive(Clone)]
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
}

impl SettingsService {
    #[must_use]
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self { repo }
    }

    /// Load persisted settings, with defaults for missing keys.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` on storage failures or when a stored
    /// value no longer parses.
    pub async fn load(&self) -> Result<QuizSettings, SettingsServiceError> {
        let options = self.repo.list_settings().await?;
        Ok(QuizSettings::from_options(
            options.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?)
    }

    /// Persist every typed setting.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` on storage failures.
    pub async fn save(&self, settings: &QuizSettings) -> Result<(), SettingsServiceError> {
        let options: Vec<(String, String)> = settings
            .to_options()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        self.repo.set_settings(&options).await?;
        Ok(())
    }

    /// Raw value of `key`, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` on storage failures.
    pub async fn get_option(&self, key: &str, default: &str) -> Result<String, SettingsServiceError> {
        Ok(self
            .repo
            .get_setting(key)
            .await?
            .unwrap_or_else(|| default.to_owned()))
    }

    /// Store one value. Known keys are validated against the typed view,
    /// other keys are kept as opaque host data.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::Settings` for an empty key or a value
    /// that does not fit a known key.
    pub async fn update_option(&self, key: &str, value: &str) -> Result<(), SettingsServiceError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SettingsError::EmptyKey.into());
        }
        let mut current = self.load().await?;
        current.set(key, value)?;
        self.repo
            .set_settings(&[(key.to_owned(), value.trim().to_owned())])
            .await?;
        tracing::info!(key, value, "setting updated");
        Ok(())
    }

    /// Returns whether the key existed.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` on storage failures.
    pub async fn delete_option(&self, key: &str) -> Result<bool, SettingsServiceError> {
        Ok(self.repo.delete_setting(key).await?)
    }

    /// Every stored key-value pair, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` on storage failures.
    pub async fn list_options(&self) -> Result<Vec<(String, String)>, SettingsServiceError> {
        Ok(self.repo.list_settings().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::SeedStrategy;
    use quiz_core::model::settings::{PASS_THRESHOLD, RANDOM_SEED_STRATEGY};
    use storage::repository::InMemoryRepository;

    fn service() -> SettingsService {
        SettingsService::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn load_defaults_when_empty() {
        let settings = service().load().await.unwrap();
        assert_eq!(settings, QuizSettings::default());
    }

    #[tokio::test]
    async fn update_validates_known_keys() {
        let svc = service();
        svc.update_option(RANDOM_SEED_STRATEGY, "fixed").await.unwrap();
        svc.update_option("theme", "dark").await.unwrap();

        let err = svc.update_option(PASS_THRESHOLD, "150").await.unwrap_err();
        assert!(matches!(
            err,
            SettingsServiceError::Settings(SettingsError::InvalidPassThreshold)
        ));
        assert!(svc.update_option("  ", "x").await.is_err());

        let settings = svc.load().await.unwrap();
        assert_eq!(settings.random_seed_strategy(), SeedStrategy::Fixed);
        assert_eq!(settings.pass_threshold(), 70);
        assert_eq!(svc.get_option("theme", "light").await.unwrap(), "dark");
        assert_eq!(svc.get_option("font", "serif").await.unwrap(), "serif");
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let svc = service();
        let settings = QuizSettings::new(4, true, SeedStrategy::Fixed, 9, true, 50).unwrap();
        svc.save(&settings).await.unwrap();
        assert_eq!(svc.load().await.unwrap(), settings);
        assert!(svc.delete_option(PASS_THRESHOLD).await.unwrap());
        assert_eq!(svc.load().await.unwrap().pass_threshold(), 70);
    }
}
