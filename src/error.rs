use thiserror::Error;

/// Engine-level error taxonomy.
///
/// Caller-input violations (bad mode, bad index, wrong-mode operation) fail
/// fast with a specific variant. `Persistence` is reported through the
/// injected [`crate::events::ErrorReporter`] and never aborts an in-memory
/// state transition.
#[derive(Error, Debug)]
pub enum QuizError {
    #[error("Invalid quiz mode: {0}")]
    InvalidMode(String),

    #[error("Topic mode requires a topic id between 1 and {0}")]
    MissingTopic(u8),

    #[error("No questions available for the requested session")]
    NoQuestionsAvailable,

    #[error("No active quiz session")]
    NoActiveSession,

    #[error("Answer index {0} is outside the valid range 0-3")]
    InvalidAnswerIndex(usize),

    #[error("Question index {index} is out of range (last index: {last})")]
    InvalidIndex { index: usize, last: usize },

    #[error("Timer cannot {action} while {phase}")]
    InvalidTimerState {
        action: &'static str,
        phase: &'static str,
    },

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, QuizError>;
