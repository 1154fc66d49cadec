mod manager;
mod progress;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use manager::{CompletedSession, SessionManager, StartConfig};
pub use progress::SessionProgress;
