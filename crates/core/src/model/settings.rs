use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const QUESTIONS_PER_SESSION: &str = "questions_per_session";
pub const ALLOW_CONCURRENT_SESSIONS: &str = "allow_concurrent_sessions";
pub const RANDOM_SEED_STRATEGY: &str = "random_seed_strategy";
pub const FIXED_SEED: &str = "fixed_seed";
pub const SHORT_FILL_ALLOWED: &str = "short_fill_allowed";
pub const PASS_THRESHOLD: &str = "pass_threshold";

/// Every key with a typed meaning in `QuizSettings`.
pub const KNOWN_KEYS: [&str; 6] = [
    QUESTIONS_PER_SESSION,
    ALLOW_CONCURRENT_SESSIONS,
    RANDOM_SEED_STRATEGY,
    FIXED_SEED,
    SHORT_FILL_ALLOWED,
    PASS_THRESHOLD,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("questions per session must be > 0")]
    InvalidQuestionsPerSession,

    #[error("pass threshold must be within 0..=100")]
    InvalidPassThreshold,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("setting key cannot be empty")]
    EmptyKey,
}

/// How a new session picks the seed for question shuffling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SeedStrategy {
    /// Every session uses `fixed_seed`, so identical content yields identical order.
    Fixed,
    /// Every session draws a fresh random seed.
    #[default]
    PerSession,
}

impl SeedStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SeedStrategy::Fixed => "fixed",
            SeedStrategy::PerSession => "per-session",
        }
    }
}

impl fmt::Display for SeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeedStrategy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fixed" => Ok(SeedStrategy::Fixed),
            "per-session" | "per_session" => Ok(SeedStrategy::PerSession),
            other => Err(SettingsError::InvalidValue {
                key: RANDOM_SEED_STRATEGY.to_owned(),
                value: other.to_owned(),
            }),
        }
    }
}

/// Typed view over the key-value settings relation.
///
/// Read once per `start_session`; sessions snapshot what they need so later
/// edits never change existing sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSettings {
    questions_per_session: u32,
    allow_concurrent_sessions: bool,
    random_seed_strategy: SeedStrategy,
    fixed_seed: u64,
    short_fill_allowed: bool,
    pass_threshold: u8,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            questions_per_session: 10,
            allow_concurrent_sessions: false,
            random_seed_strategy: SeedStrategy::PerSession,
            fixed_seed: 0,
            short_fill_allowed: false,
            pass_threshold: 70,
        }
    }
}

impl QuizSettings {
    /// Creates validated settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the session size is zero or the pass
    /// threshold is above 100.
    pub fn new(
        questions_per_session: u32,
        allow_concurrent_sessions: bool,
        random_seed_strategy: SeedStrategy,
        fixed_seed: u64,
        short_fill_allowed: bool,
        pass_threshold: u8,
    ) -> Result<Self, SettingsError> {
        if questions_per_session == 0 {
            return Err(SettingsError::InvalidQuestionsPerSession);
        }
        if pass_threshold > 100 {
            return Err(SettingsError::InvalidPassThreshold);
        }
        Ok(Self {
            questions_per_session,
            allow_concurrent_sessions,
            random_seed_strategy,
            fixed_seed,
            short_fill_allowed,
            pass_threshold,
        })
    }

    /// Build settings from stored key-value pairs, falling back to defaults
    /// for missing keys. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if a known key holds an unparseable value.
    pub fn from_options<'a, I>(options: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Self::default();
        for (key, value) in options {
            settings.set(key, value)?;
        }
        Self::new(
            settings.questions_per_session,
            settings.allow_concurrent_sessions,
            settings.random_seed_strategy,
            settings.fixed_seed,
            settings.short_fill_allowed,
            settings.pass_threshold,
        )
    }

    /// Serialize into the key-value layout.
    #[must_use]
    pub fn to_options(&self) -> Vec<(&'static str, String)> {
        vec![
            (QUESTIONS_PER_SESSION, self.questions_per_session.to_string()),
            (
                ALLOW_CONCURRENT_SESSIONS,
                self.allow_concurrent_sessions.to_string(),
            ),
            (RANDOM_SEED_STRATEGY, self.random_seed_strategy.to_string()),
            (FIXED_SEED, self.fixed_seed.to_string()),
            (SHORT_FILL_ALLOWED, self.short_fill_allowed.to_string()),
            (PASS_THRESHOLD, self.pass_threshold.to_string()),
        ]
    }

    /// Apply one key-value pair in place.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the key is known and the value does not
    /// parse or violates its range.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let value = value.trim();
        match key {
            QUESTIONS_PER_SESSION => {
                let parsed: u32 = parse_value(key, value)?;
                if parsed == 0 {
                    return Err(SettingsError::InvalidQuestionsPerSession);
                }
                self.questions_per_session = parsed;
            }
            ALLOW_CONCURRENT_SESSIONS => {
                self.allow_concurrent_sessions = parse_bool(key, value)?;
            }
            RANDOM_SEED_STRATEGY => self.random_seed_strategy = value.parse()?,
            FIXED_SEED => self.fixed_seed = parse_value(key, value)?,
            SHORT_FILL_ALLOWED => self.short_fill_allowed = parse_bool(key, value)?,
            PASS_THRESHOLD => {
                let parsed: u8 = parse_value(key, value)?;
                if parsed > 100 {
                    return Err(SettingsError::InvalidPassThreshold);
                }
                self.pass_threshold = parsed;
            }
            _ => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn questions_per_session(&self) -> u32 {
        self.questions_per_session
    }

    #[must_use]
    pub fn allow_concurrent_sessions(&self) -> bool {
        self.allow_concurrent_sessions
    }

    #[must_use]
    pub fn random_seed_strategy(&self) -> SeedStrategy {
        self.random_seed_strategy
    }

    #[must_use]
    pub fn fixed_seed(&self) -> u64 {
        self.fixed_seed
    }

    #[must_use]
    pub fn short_fill_allowed(&self) -> bool {
        self.short_fill_allowed
    }

    #[must_use]
    pub fn pass_threshold(&self) -> u8 {
        self.pass_threshold
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

// Accepts the loose spellings hosts tend to store ("1", "yes", "on").
fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_keys() {
        let settings = QuizSettings::from_options([(SHORT_FILL_ALLOWED, "yes")]).unwrap();
        assert!(settings.short_fill_allowed());
        assert_eq!(settings.questions_per_session(), 10);
        assert_eq!(settings.random_seed_strategy(), SeedStrategy::PerSession);
        assert_eq!(settings.pass_threshold(), 70);
    }

    #[test]
    fn round_trips_through_options() {
        let settings =
            QuizSettings::new(5, true, SeedStrategy::Fixed, 1234, true, 55).unwrap();
        let stored = settings.to_options();
        let parsed =
            QuizSettings::from_options(stored.iter().map(|(k, v)| (*k, v.as_str()))).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            QuizSettings::from_options([(QUESTIONS_PER_SESSION, "0")]).unwrap_err(),
            SettingsError::InvalidQuestionsPerSession
        );
        assert_eq!(
            QuizSettings::from_options([(PASS_THRESHOLD, "101")]).unwrap_err(),
            SettingsError::InvalidPassThreshold
        );
        assert!(matches!(
            QuizSettings::from_options([(RANDOM_SEED_STRATEGY, "sometimes")]).unwrap_err(),
            SettingsError::InvalidValue { .. }
        ));
        assert!(matches!(
            QuizSettings::from_options([(ALLOW_CONCURRENT_SESSIONS, "maybe")]).unwrap_err(),
            SettingsError::InvalidValue { .. }
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let settings = QuizSettings::from_options([("theme", "dark")]).unwrap();
        assert_eq!(settings, QuizSettings::default());
    }
}
