//! Outbound notifications for hosts (analytics, emails, webhooks).
//!
//! The engine calls the sink after a lifecycle change is committed. Sink
//! failures are logged and never undo or fail the operation.

use quiz_core::model::Session;
use quiz_core::scoring::ScoreReport;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("event sink failed: {0}")]
pub struct SinkError(pub String);

pub trait QuizEventSink: Send + Sync {
    /// Called once per session, after completion and stats are stored.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` when the host could not handle the event.
    fn session_completed(&self, _session: &Session, _report: &ScoreReport) -> Result<(), SinkError> {
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SinkError` when the host could not handle the event.
    fn session_abandoned(&self, _session: &Session) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl QuizEventSink for NoopEventSink {}

pub(crate) fn notify_completed(sink: &dyn QuizEventSink, session: &Session, report: &ScoreReport) {
    if let Err(err) = sink.session_completed(session, report) {
        tracing::warn!(session_id = %session.id(), error = %err, "completion event dropped");
    }
}

pub(crate) fn notify_abandoned(sink: &dyn QuizEventSink, session: &Session) {
    if let Err(err) = sink.session_abandoned(session) {
        tracing::warn!(session_id = %session.id(), error = %err, "abandon event dropped");
    }
}
