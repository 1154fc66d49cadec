#![forbid(unsafe_code)]

pub mod app_services;
pub mod content_service;
pub mod error;
pub mod events;
pub mod scoring_service;
pub mod selection;
pub mod sessions;
pub mod settings_service;
pub mod stats_service;

pub use quiz_core::Clock;

pub use app_services::QuizServices;
pub use content_service::ContentService;
pub use error::{
    AppServicesError, ContentError, ErrorKind, ScoringServiceError, ServiceError, SessionError,
    SettingsServiceError, StatsServiceError,
};
pub use events::{NoopEventSink, QuizEventSink, SinkError};
pub use scoring_service::ScoringService;
pub use sessions::{CompletedSession, SessionManager, SessionProgress, StartConfig};
pub use settings_service::SettingsService;
pub use stats_service::StatsService;
