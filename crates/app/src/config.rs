use std::env;

/// Process configuration read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_url = env::var("QUIZ_DB_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| "sqlite://quiz.sqlite3".into(), crate::normalize_sqlite_url);
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self { db_url, rust_log }
    }
}
