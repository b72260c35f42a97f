//! QuizMate: a headless, resumable quiz session engine.
//!
//! The engine turns a static question bank into a stateful examination
//! process: mode-dependent question selection, a pausable countdown with
//! auto-submit, multi-dimensional scoring, and crash-safe session
//! persistence through an injected store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use quizmate::{
//!     EngineConfig, InMemoryQuestionBank, InMemorySessionStore, QuizEngine, SessionMode,
//! };
//!
//! let bank = Arc::new(InMemoryQuestionBank::new(load_questions()));
//! let store = Arc::new(InMemorySessionStore::new());
//! let engine = QuizEngine::new(bank, store, EngineConfig::from_env());
//!
//! engine.start_session(SessionMode::Topic, Some(3), None)?;
//! engine.submit_answer(1)?;
//! let results = engine.end_session()?;
//! println!("{}% correct", results.score.percentage);
//! # fn load_questions() -> Vec<quizmate::Question> { Vec::new() }
//! # Ok::<(), quizmate::QuizError>(())
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod quiz;
pub mod session;

pub use config::{EngineConfig, GradeCutoff};
pub use error::{QuizError, Result};
pub use events::{EngineEvents, ErrorReporter, LogReporter, ModeEvent};
pub use quiz::*;
pub use session::*;

/// Convenience logger setup for binaries and examples; library users with
/// their own logging should skip this.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();
}
