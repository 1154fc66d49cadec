mod answer;
mod category;
mod ids;
mod question;
mod session;
pub mod settings;
mod stats;

pub use answer::UserAnswer;
pub use category::{Category, CategoryError};
pub use ids::{CategoryId, OptionId, ParseIdError, QuestionId, SessionId, UserId};
pub use question::{
    AnswerOption, OptionDraft, Question, QuestionDraft, QuestionError, QuestionKind,
    ValidatedQuestion, same_options,
};
pub use session::{
    CategoryScope, NewSession, Session, SessionScore, SessionStateError, SessionStatus,
};
pub use settings::{QuizSettings, SeedStrategy, SettingsError};
pub use stats::{StatsDelta, StatsError, UserStats};
