pub mod store;

pub use store::*;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QuizError;
use crate::quiz::answers::AnswerRecord;
use crate::quiz::timer::TimerSnapshot;

/// How a session selects questions, times itself, and gives feedback.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Untimed drill on a single topic, no immediate feedback.
    Topic,
    /// Timed, fixed-length, balanced across topics; auto-submits on expiry.
    FullExam,
    /// Untimed, open-ended, immediate feedback, growable question list.
    OpenStudy,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Topic => "topic",
            SessionMode::FullExam => "full_exam",
            SessionMode::OpenStudy => "open_study",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topic" => Ok(SessionMode::Topic),
            "full_exam" => Ok(SessionMode::FullExam),
            "open_study" => Ok(SessionMode::OpenStudy),
            other => Err(QuizError::InvalidMode(other.to_string())),
        }
    }
}

/// The serializable session state. This is also the persisted payload shape;
/// the persistence port only ever sees its JSON form and treats it as opaque.
///
/// `answers` maps question index to record; absence means unanswered, so a
/// half-finished exam has first-class gaps instead of array holes.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuizSession {
    pub session_id: Uuid,
    pub mode: SessionMode,
    pub topic_id: Option<u8>,
    pub question_ids: Vec<String>,
    pub current_index: usize,
    pub answers: BTreeMap<usize, AnswerRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timer: Option<TimerSnapshot>,
    pub active: bool,
}

impl QuizSession {
    pub fn new(mode: SessionMode, topic_id: Option<u8>, question_ids: Vec<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            mode,
            topic_id,
            question_ids,
            current_index: 0,
            answers: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            timer: None,
            active: true,
        }
    }

    /// Structural validation for payloads coming back from persistence. A
    /// payload that fails here is discarded (cold start), never propagated
    /// as an error.
    pub fn is_structurally_sound(&self) -> bool {
        if self.question_ids.is_empty() {
            return false;
        }
        if self.current_index >= self.question_ids.len() {
            return false;
        }
        if self
            .answers
            .keys()
            .any(|&idx| idx >= self.question_ids.len())
        {
            return false;
        }
        if self.answers.values().any(|a| a.selected_index > 3) {
            return false;
        }
        if let Some(timer) = &self.timer {
            if timer.remaining_ms > timer.total_duration_ms {
                return false;
            }
        }
        true
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// True iff every question index holds an answer record.
    pub fn is_complete(&self) -> bool {
        !self.question_ids.is_empty() && self.answers.len() == self.question_ids.len()
    }
}
