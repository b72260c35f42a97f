use log::warn;

use crate::error::QuizError;
use crate::quiz::answers::AnswerRecord;
use crate::quiz::engine::SessionResults;
use crate::quiz::questions::Question;

/// Mode-specific notifications that only some session modes produce.
#[derive(Clone, Debug, PartialEq)]
pub enum ModeEvent {
    /// Open study grades every answer immediately.
    ImmediateFeedback {
        question_id: String,
        correct: bool,
        correct_index: usize,
        explanation: Option<String>,
    },
    /// The exam timer expired and the session was submitted without caller
    /// action.
    AutoSubmit,
}

type QuestionChangedHandler = Box<dyn FnMut(usize, &Question) + Send>;
type AnswerSubmittedHandler = Box<dyn FnMut(&AnswerRecord) + Send>;
type SessionCompletedHandler = Box<dyn FnMut(&SessionResults) + Send>;
type TimerTickHandler = Box<dyn FnMut(u64) + Send>;
type TimerWarningHandler = Box<dyn FnMut(u64) + Send>;
type ModeEventHandler = Box<dyn FnMut(&ModeEvent) + Send>;

/// Synchronous callback registry for the engine's notification surface.
///
/// At most one handler per event; setting a handler replaces the previous
/// one. Handlers run on whichever thread triggered the transition (the
/// caller's, or the timer tick task) while the engine lock is held, so they
/// must not call back into the engine.
#[derive(Default)]
pub struct EngineEvents {
    pub(crate) on_question_changed: Option<QuestionChangedHandler>,
    pub(crate) on_answer_submitted: Option<AnswerSubmittedHandler>,
    pub(crate) on_session_completed: Option<SessionCompletedHandler>,
    pub(crate) on_timer_tick: Option<TimerTickHandler>,
    pub(crate) on_timer_warning: Option<TimerWarningHandler>,
    pub(crate) on_mode_event: Option<ModeEventHandler>,
}

impl EngineEvents {
    pub(crate) fn emit_question_changed(&mut self, index: usize, question: &Question) {
        if let Some(handler) = self.on_question_changed.as_mut() {
            handler(index, question);
        }
    }

    pub(crate) fn emit_answer_submitted(&mut self, record: &AnswerRecord) {
        if let Some(handler) = self.on_answer_submitted.as_mut() {
            handler(record);
        }
    }

    pub(crate) fn emit_session_completed(&mut self, results: &SessionResults) {
        if let Some(handler) = self.on_session_completed.as_mut() {
            handler(results);
        }
    }

    pub(crate) fn emit_timer_tick(&mut self, remaining_ms: u64) {
        if let Some(handler) = self.on_timer_tick.as_mut() {
            handler(remaining_ms);
        }
    }

    pub(crate) fn emit_timer_warning(&mut self, minutes_left: u64) {
        if let Some(handler) = self.on_timer_warning.as_mut() {
            handler(minutes_left);
        }
    }

    pub(crate) fn emit_mode_event(&mut self, event: &ModeEvent) {
        if let Some(handler) = self.on_mode_event.as_mut() {
            handler(event);
        }
    }
}

/// Collaborator that receives non-fatal failures (persistence degradation).
///
/// Injected at engine construction instead of being reached through a global
/// error handler, so embedders can route reports to their own surface.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &QuizError);
}

/// Default reporter: a log line, nothing else. Degraded persistence is a
/// warning to the user, never an interruption of the quiz.
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, context: &str, error: &QuizError) {
        warn!("⚠️ {context}: {error}");
    }
}
