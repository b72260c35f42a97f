use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{QuizError, Result};
use crate::events::{EngineEvents, ErrorReporter, LogReporter, ModeEvent};
use crate::session::{QuizSession, SessionMode, SessionStore};

use super::answers::AnswerRecord;
use super::questions::{Question, QuestionRepository};
use super::scoring::{ScoreResult, ScoringStrategy, StandardScoring};
use super::selector::{select_distributed, select_uniform};
use super::timer::{QuizTimer, TickHandle, TickSource, TimerPhase, TokioTicker};

/// Persist the timer snapshot every N ticks so a crash mid-exam loses at
/// most half a minute of countdown.
const TIMER_CHECKPOINT_TICKS: u64 = 30;

/// Everything handed back when a session finishes, whether by explicit end
/// or timer auto-submit.
#[derive(Serialize, Clone, Debug)]
pub struct SessionResults {
    pub session_id: Uuid,
    pub mode: SessionMode,
    pub score: ScoreResult,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Countdown accounting, full exams only.
    pub time_used_ms: Option<u64>,
    pub time_remaining_ms: Option<u64>,
    pub auto_submitted: bool,
}

struct ActiveSession {
    state: QuizSession,
    questions: Vec<Question>,
    timer: Option<QuizTimer>,
    timer_handle: Option<Box<dyn TickHandle>>,
    ticks_since_checkpoint: u64,
}

struct EngineInner {
    config: EngineConfig,
    repository: Arc<dyn QuestionRepository>,
    store: Arc<dyn SessionStore>,
    scoring: Box<dyn ScoringStrategy>,
    reporter: Arc<dyn ErrorReporter>,
    tick_source: Arc<dyn TickSource>,
    events: EngineEvents,
    session: Option<ActiveSession>,
}

/// The quiz session state machine.
///
/// Owns at most one active session at a time; every collaborator (question
/// repository, persistence, scoring, error reporting, tick scheduling) is
/// injected at construction. All public operations are synchronous; the only
/// autonomous activity is the exam countdown, driven by the tick source.
///
/// Persistence is write-behind: the in-memory session is the source of truth
/// and a failing store degrades to a reported warning, never an aborted
/// transition.
pub struct QuizEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl QuizEngine {
    /// Engine with the stock collaborators: standard scoring calibrated from
    /// `config`, log-only error reporting, and the tokio 1 Hz ticker (timed
    /// sessions therefore need a tokio runtime).
    pub fn new(
        repository: Arc<dyn QuestionRepository>,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> Self {
        let scoring = Box::new(StandardScoring::new(
            config.topic_count,
            config.grade_cutoffs.clone(),
        ));
        Self::with_collaborators(
            repository,
            store,
            scoring,
            Arc::new(LogReporter),
            Arc::new(TokioTicker),
            config,
        )
    }

    /// Fully injected construction, for embedders that bring their own
    /// scoring calibration, error surface, or tick scheduler.
    pub fn with_collaborators(
        repository: Arc<dyn QuestionRepository>,
        store: Arc<dyn SessionStore>,
        scoring: Box<dyn ScoringStrategy>,
        reporter: Arc<dyn ErrorReporter>,
        tick_source: Arc<dyn TickSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                config: config.normalized(),
                repository,
                store,
                scoring,
                reporter,
                tick_source,
                events: EngineEvents::default(),
                session: None,
            })),
        }
    }

    // -- notification surface -------------------------------------------

    pub fn set_on_question_changed(&self, handler: impl FnMut(usize, &Question) + Send + 'static) {
        self.inner.lock().events.on_question_changed = Some(Box::new(handler));
    }

    pub fn set_on_answer_submitted(&self, handler: impl FnMut(&AnswerRecord) + Send + 'static) {
        self.inner.lock().events.on_answer_submitted = Some(Box::new(handler));
    }

    pub fn set_on_session_completed(&self, handler: impl FnMut(&SessionResults) + Send + 'static) {
        self.inner.lock().events.on_session_completed = Some(Box::new(handler));
    }

    pub fn set_on_timer_tick(&self, handler: impl FnMut(u64) + Send + 'static) {
        self.inner.lock().events.on_timer_tick = Some(Box::new(handler));
    }

    pub fn set_on_timer_warning(&self, handler: impl FnMut(u64) + Send + 'static) {
        self.inner.lock().events.on_timer_warning = Some(Box::new(handler));
    }

    pub fn set_on_mode_event(&self, handler: impl FnMut(&ModeEvent) + Send + 'static) {
        self.inner.lock().events.on_mode_event = Some(Box::new(handler));
    }

    // -- session lifecycle ----------------------------------------------

    /// Starts a session, discarding any session still active (callers are
    /// expected to end first; recovery flows must not deadlock on it).
    ///
    /// `count_override` only applies to Topic mode.
    pub fn start_session(
        &self,
        mode: SessionMode,
        topic_id: Option<u8>,
        count_override: Option<usize>,
    ) -> Result<Uuid> {
        let mut inner = self.inner.lock();
        let session_id = inner.begin_session(mode, topic_id, count_override)?;
        self.spawn_ticker_if_needed(&mut inner);
        inner.dispatch_question_changed();
        Ok(session_id)
    }

    /// Submits an answer for the question under the cursor. Resubmitting
    /// overwrites: last answer wins.
    pub fn submit_answer(&self, selected_index: usize) -> Result<AnswerRecord> {
        self.inner.lock().submit_answer(selected_index)
    }

    /// Moves the cursor to an arbitrary question.
    pub fn navigate(&self, target_index: usize) -> Result<()> {
        self.inner.lock().navigate(target_index)
    }

    /// Advances the cursor; `Ok(false)` at the end of the sequence.
    pub fn next(&self) -> Result<bool> {
        self.inner.lock().step(1)
    }

    /// Moves the cursor back; `Ok(false)` at the start of the sequence.
    pub fn previous(&self) -> Result<bool> {
        self.inner.lock().step(-1)
    }

    /// Appends freshly selected, non-duplicate questions. Open study only.
    pub fn add_more_questions(&self, count: usize) -> Result<usize> {
        self.inner.lock().add_more_questions(count)
    }

    /// Ends the session: final score, timer teardown, bookkeeping writes,
    /// completion event. The session is gone afterwards; the returned
    /// results are the caller's copy.
    pub fn end_session(&self) -> Result<SessionResults> {
        self.inner.lock().complete_session(false)
    }

    /// Freezes the countdown (no-op for untimed modes).
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let session = inner.session.as_mut().ok_or(QuizError::NoActiveSession)?;
        if let Some(timer) = session.timer.as_mut() {
            timer.pause();
        }
        inner.persist_current();
        Ok(())
    }

    /// Resumes a paused countdown (no-op for untimed modes).
    pub fn resume(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let session = inner.session.as_mut().ok_or(QuizError::NoActiveSession)?;
        if let Some(timer) = session.timer.as_mut() {
            timer.resume();
        }
        inner.persist_current();
        // A session restored while paused has no tick loop yet.
        self.spawn_ticker_if_needed(&mut inner);
        Ok(())
    }

    /// Restores a previously persisted, non-terminal session. Returns false
    /// on cold start: nothing saved, malformed payload (discarded), an
    /// already-terminal payload, or no resolvable questions left. Never
    /// fails on bad data.
    pub fn resume_saved_session(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.session.is_some() {
            warn!("Resume requested while a session is active, keeping the live session");
            return false;
        }
        if !inner.restore_saved() {
            return false;
        }
        self.spawn_ticker_if_needed(&mut inner);
        inner.dispatch_question_changed();
        true
    }

    // -- read-only accessors --------------------------------------------

    pub fn has_active_session(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    pub fn current_question(&self) -> Option<(usize, Question)> {
        let inner = self.inner.lock();
        let session = inner.session.as_ref()?;
        let index = session.state.current_index;
        session.questions.get(index).map(|q| (index, q.clone()))
    }

    pub fn question_count(&self) -> usize {
        self.inner
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.questions.len())
    }

    pub fn answered_count(&self) -> usize {
        self.inner
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.state.answered_count())
    }

    /// True iff every question in the sequence has an answer record.
    pub fn is_quiz_complete(&self) -> bool {
        self.inner
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.state.is_complete())
    }

    pub fn session_snapshot(&self) -> Option<QuizSession> {
        let mut inner = self.inner.lock();
        let session = inner.session.as_mut()?;
        if let Some(timer) = &session.timer {
            session.state.timer = Some(timer.snapshot());
        }
        Some(session.state.clone())
    }

    pub fn time_remaining_ms(&self) -> Option<u64> {
        self.inner
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.timer.as_ref())
            .map(|t| t.remaining_ms())
    }

    pub fn formatted_time_remaining(&self) -> Option<String> {
        self.time_remaining_ms().map(super::timer::format_remaining)
    }

    fn spawn_ticker_if_needed(&self, inner: &mut EngineInner) {
        let needs_ticker = inner
            .session
            .as_ref()
            .is_some_and(|s| {
                s.timer_handle.is_none()
                    && s.timer.as_ref().is_some_and(|t| t.is_running())
            });
        if !needs_ticker {
            return;
        }
        let engine = Arc::clone(&self.inner);
        let handle = inner.tick_source.spawn(
            Duration::from_secs(1),
            Box::new(move || engine.lock().handle_tick()),
        );
        if let Some(session) = inner.session.as_mut() {
            session.timer_handle = Some(handle);
        }
    }
}

impl EngineInner {
    fn begin_session(
        &mut self,
        mode: SessionMode,
        topic_id: Option<u8>,
        count_override: Option<usize>,
    ) -> Result<Uuid> {
        if let Some(mut old) = self.session.take() {
            warn!(
                "Starting a new session while {} is active, discarding it",
                old.state.session_id
            );
            if let Some(mut handle) = old.timer_handle.take() {
                handle.cancel();
            }
            if let Some(timer) = old.timer.as_mut() {
                timer.stop();
            }
        }

        let topic_id = match mode {
            SessionMode::Topic => {
                let topic = topic_id.ok_or(QuizError::MissingTopic(self.config.topic_count))?;
                if topic < 1 || topic > self.config.topic_count {
                    return Err(QuizError::MissingTopic(self.config.topic_count));
                }
                Some(topic)
            }
            _ => None,
        };

        let questions = match mode {
            SessionMode::FullExam => {
                let pool = self.repository.get_all();
                let total = self.config.exam_question_count.min(pool.len());
                select_distributed(&pool, total, usize::from(self.config.topic_count))
            }
            SessionMode::Topic => {
                let pool = self.repository.get_by_topic(topic_id.unwrap_or(0));
                let count = count_override.unwrap_or(self.config.topic_question_count);
                select_uniform(&pool, count, None)
            }
            SessionMode::OpenStudy => {
                let pool = self.repository.get_all();
                select_uniform(&pool, self.config.open_study_batch_size, None)
            }
        };

        if questions.is_empty() {
            return Err(QuizError::NoQuestionsAvailable);
        }

        let question_ids = questions.iter().map(|q| q.id.clone()).collect();
        let mut state = QuizSession::new(mode, topic_id, question_ids);

        let timer = if mode == SessionMode::FullExam {
            let mut timer = QuizTimer::new(self.config.warning_thresholds_minutes.clone());
            timer.start(self.config.exam_duration_minutes)?;
            state.timer = Some(timer.snapshot());
            Some(timer)
        } else {
            None
        };

        let session_id = state.session_id;
        info!(
            "🎬 Session {} started: mode={}, {} questions",
            session_id,
            mode,
            questions.len()
        );

        self.session = Some(ActiveSession {
            state,
            questions,
            timer,
            timer_handle: None,
            ticks_since_checkpoint: 0,
        });
        self.persist_current();
        Ok(session_id)
    }

    fn submit_answer(&mut self, selected_index: usize) -> Result<AnswerRecord> {
        let session = self.session.as_mut().ok_or(QuizError::NoActiveSession)?;
        if selected_index > 3 {
            return Err(QuizError::InvalidAnswerIndex(selected_index));
        }

        let index = session.state.current_index;
        let question = session
            .questions
            .get(index)
            .cloned()
            .ok_or(QuizError::NoActiveSession)?;

        let record = AnswerRecord::new(&question, selected_index);
        let replaced = session.state.answers.insert(index, record.clone());
        if replaced.is_some() {
            info!("📝 Answer for question {} overwritten", index + 1);
        }
        let mode = session.state.mode;

        self.persist_current();
        self.events.emit_answer_submitted(&record);
        if mode == SessionMode::OpenStudy {
            self.events.emit_mode_event(&ModeEvent::ImmediateFeedback {
                question_id: question.id.clone(),
                correct: record.is_correct,
                correct_index: question.correct_index,
                explanation: question.explanation.clone(),
            });
        }
        Ok(record)
    }

    fn navigate(&mut self, target_index: usize) -> Result<()> {
        let session = self.session.as_mut().ok_or(QuizError::NoActiveSession)?;
        let last = session.questions.len().saturating_sub(1);
        if target_index >= session.questions.len() {
            return Err(QuizError::InvalidIndex {
                index: target_index,
                last,
            });
        }
        session.state.current_index = target_index;
        self.persist_current();
        self.dispatch_question_changed();
        Ok(())
    }

    fn step(&mut self, delta: i64) -> Result<bool> {
        let session = self.session.as_ref().ok_or(QuizError::NoActiveSession)?;
        let current = session.state.current_index as i64;
        let target = current + delta;
        if target < 0 || target >= session.questions.len() as i64 {
            return Ok(false);
        }
        self.navigate(target as usize)?;
        Ok(true)
    }

    fn add_more_questions(&mut self, count: usize) -> Result<usize> {
        let session = self.session.as_mut().ok_or(QuizError::NoActiveSession)?;
        if session.state.mode != SessionMode::OpenStudy {
            return Err(QuizError::InvalidMode(session.state.mode.to_string()));
        }

        let seen: HashSet<&str> = session
            .state
            .question_ids
            .iter()
            .map(|id| id.as_str())
            .collect();
        let pool: Vec<Question> = self
            .repository
            .get_all()
            .into_iter()
            .filter(|q| !seen.contains(q.id.as_str()))
            .collect();

        let fresh = select_uniform(&pool, count, None);
        let added = fresh.len();
        if added == 0 {
            warn!("No unseen questions left to add");
            return Ok(0);
        }

        for q in fresh {
            session.state.question_ids.push(q.id.clone());
            session.questions.push(q);
        }
        info!("➕ Added {added} questions to the open study session");
        self.persist_current();
        Ok(added)
    }

    /// The single completion path, shared by explicit end and timer expiry.
    /// Every persistence write in here is non-fatal: the session always
    /// leaves the Active state.
    fn complete_session(&mut self, auto_submitted: bool) -> Result<SessionResults> {
        let mut session = self.session.take().ok_or(QuizError::NoActiveSession)?;

        let (time_used_ms, time_remaining_ms) = match session.timer.as_mut() {
            Some(timer) => {
                let remaining = timer.remaining_ms();
                let used = timer.total_duration_ms().saturating_sub(remaining);
                timer.stop();
                (Some(used), Some(remaining))
            }
            None => (None, None),
        };
        if let Some(mut handle) = session.timer_handle.take() {
            handle.cancel();
        }

        let score = self.scoring.calculate(
            &session.questions,
            &session.state.answers,
            session.state.mode,
        );

        let completed_at = Utc::now();
        session.state.completed_at = Some(completed_at);
        session.state.active = false;

        for topic in &score.per_topic_breakdown {
            if topic.total == 0 {
                continue;
            }
            if let Err(e) = self
                .store
                .update_topic_stats(topic.topic, topic.correct, topic.total)
            {
                self.report("topic stats update", QuizError::Persistence(e.to_string()));
            }
        }
        if session.state.mode == SessionMode::FullExam {
            if let Err(e) = self.store.record_completed_exam(
                score.correct_count,
                score.answered_count,
                &score.per_topic_breakdown,
            ) {
                self.report("exam record", QuizError::Persistence(e.to_string()));
            }
        }
        if let Err(e) = self.store.clear_current() {
            self.report("session clear", QuizError::Persistence(e.to_string()));
        }

        let results = SessionResults {
            session_id: session.state.session_id,
            mode: session.state.mode,
            score,
            started_at: session.state.started_at,
            completed_at,
            duration_seconds: (completed_at - session.state.started_at).num_seconds(),
            time_used_ms,
            time_remaining_ms,
            auto_submitted,
        };

        info!(
            "✅ Session {} completed: {}/{} correct ({}%)",
            results.session_id,
            results.score.correct_count,
            results.score.answered_count,
            results.score.percentage
        );

        self.events.emit_session_completed(&results);
        if auto_submitted {
            self.events.emit_mode_event(&ModeEvent::AutoSubmit);
        }
        Ok(results)
    }

    /// One second of countdown, called from the tick source. Returns false
    /// when the tick loop should retire.
    fn handle_tick(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let Some(timer) = session.timer.as_mut() else {
            return false;
        };

        let outcome = timer.tick(1000);
        match timer.phase() {
            TimerPhase::Paused => return true,
            TimerPhase::Running => {}
            TimerPhase::Expired => {
                self.events.emit_timer_tick(outcome.remaining_ms);
                info!("⏰ Time is up, auto-submitting the exam");
                let _ = self.complete_session(true);
                return false;
            }
            TimerPhase::Idle | TimerPhase::Stopped => return false,
        }

        session.ticks_since_checkpoint += 1;
        let checkpoint = session.ticks_since_checkpoint >= TIMER_CHECKPOINT_TICKS;
        if checkpoint {
            session.ticks_since_checkpoint = 0;
        }

        let warnings = outcome.warnings.clone();
        self.events.emit_timer_tick(outcome.remaining_ms);
        for minutes in warnings {
            warn!("⏳ {minutes} minute(s) remaining");
            self.events.emit_timer_warning(minutes);
        }
        if checkpoint {
            self.persist_current();
        }
        true
    }

    fn restore_saved(&mut self) -> bool {
        let payload = match self.store.load_current() {
            Ok(Some(payload)) => payload,
            Ok(None) => return false,
            Err(e) => {
                self.report("session load", QuizError::Persistence(e.to_string()));
                return false;
            }
        };

        let state: QuizSession = match serde_json::from_value(payload) {
            Ok(state) => state,
            Err(e) => {
                warn!("Discarding malformed saved session: {e}");
                let _ = self.store.clear_current();
                return false;
            }
        };

        if !state.active || state.completed_at.is_some() || !state.is_structurally_sound() {
            warn!("Discarding saved session that is terminal or unsound");
            let _ = self.store.clear_current();
            return false;
        }

        // Re-resolve ids against the live repository; questions that no
        // longer exist are dropped and the answer indices shift with them.
        let by_id: HashMap<String, Question> = self
            .repository
            .get_all()
            .into_iter()
            .map(|q| (q.id.clone(), q))
            .collect();

        let mut questions = Vec::new();
        let mut answers = std::collections::BTreeMap::new();
        let mut cursor = 0usize;
        let mut dropped = 0usize;
        for (old_index, id) in state.question_ids.iter().enumerate() {
            match by_id.get(id) {
                Some(question) => {
                    if old_index == state.current_index {
                        cursor = questions.len();
                    }
                    if let Some(record) = state.answers.get(&old_index) {
                        answers.insert(questions.len(), record.clone());
                    }
                    questions.push(question.clone());
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!("{dropped} saved question(s) no longer resolve, dropping them");
        }
        if questions.is_empty() {
            warn!("Saved session has no resolvable questions left, cold starting");
            let _ = self.store.clear_current();
            return false;
        }

        let timer = state.timer.as_ref().map(|snapshot| {
            QuizTimer::from_snapshot(snapshot, self.config.warning_thresholds_minutes.clone())
        });

        let mut restored = state;
        restored.question_ids = questions.iter().map(|q| q.id.clone()).collect();
        restored.current_index = cursor.min(questions.len() - 1);
        restored.answers = answers;

        info!(
            "🔄 Resumed session {}: {} questions, {} answered",
            restored.session_id,
            questions.len(),
            restored.answered_count()
        );

        self.session = Some(ActiveSession {
            state: restored,
            questions,
            timer,
            timer_handle: None,
            ticks_since_checkpoint: 0,
        });
        self.persist_current();
        true
    }

    /// Write-behind save of the current session. Failures are reported and
    /// swallowed; the in-memory state has already moved on.
    fn persist_current(&mut self) {
        let payload = {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            if let Some(timer) = &session.timer {
                session.state.timer = Some(timer.snapshot());
            }
            match serde_json::to_value(&session.state) {
                Ok(payload) => payload,
                Err(e) => {
                    self.report("session serialize", QuizError::Persistence(e.to_string()));
                    return;
                }
            }
        };
        match self.store.save_current(&payload) {
            Ok(true) => {}
            Ok(false) => self.report(
                "session save",
                QuizError::Persistence("store declined the write".to_string()),
            ),
            Err(e) => self.report("session save", QuizError::Persistence(e.to_string())),
        }
    }

    fn dispatch_question_changed(&mut self) {
        if let Some(session) = self.session.as_ref() {
            if let Some(question) = session.questions.get(session.state.current_index) {
                self.events
                    .emit_question_changed(session.state.current_index, question);
            }
        }
    }

    fn report(&self, context: &str, error: QuizError) {
        self.reporter.report(context, &error);
    }
}
