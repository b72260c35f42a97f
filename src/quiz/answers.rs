use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::questions::Question;

/// One recorded answer. Correctness is derived and cached at submit time;
/// resubmitting for the same question replaces the record (last answer wins).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnswerRecord {
    pub question_id: String,
    pub selected_index: usize,
    pub is_correct: bool,
    pub submitted_at: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn new(question: &Question, selected_index: usize) -> Self {
        Self {
            question_id: question.id.clone(),
            selected_index,
            is_correct: selected_index == question.correct_index,
            submitted_at: Utc::now(),
        }
    }
}
