use log::warn;
use serde::{Deserialize, Serialize};

/// A single multiple-choice question, immutable once loaded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Question {
    pub id: String,
    /// Curriculum unit, 1-5.
    pub topic: u8,
    pub prompt: String,
    /// 2-4 answer options; `correct_index` always indexes into this list.
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: Option<String>,
}

impl Question {
    /// Structural sanity check. Content validation (prompt quality, option
    /// wording) is the question bank's job, not the engine's.
    pub fn is_structurally_valid(&self) -> bool {
        !self.prompt.is_empty()
            && (2..=4).contains(&self.options.len())
            && self.options.iter().all(|o| !o.is_empty())
            && self.correct_index < self.options.len()
            && self.topic >= 1
    }
}

/// Read-only source of validated questions. The engine never mutates the
/// bank; ingestion and normalization happen on the other side of this port.
pub trait QuestionRepository: Send + Sync {
    fn get_all(&self) -> Vec<Question>;
    fn get_by_topic(&self, topic_id: u8) -> Vec<Question>;
}

/// Reference repository backed by a plain `Vec`, for embedders that load the
/// whole bank up front and for tests.
pub struct InMemoryQuestionBank {
    questions: Vec<Question>,
}

impl InMemoryQuestionBank {
    /// Structurally invalid questions are dropped with a warning rather than
    /// poisoning later sessions.
    pub fn new(questions: Vec<Question>) -> Self {
        let before = questions.len();
        let questions: Vec<Question> = questions
            .into_iter()
            .filter(|q| {
                let ok = q.is_structurally_valid();
                if !ok {
                    warn!("Dropping structurally invalid question '{}'", q.id);
                }
                ok
            })
            .collect();
        if questions.len() < before {
            warn!(
                "Question bank loaded {} of {} questions",
                questions.len(),
                before
            );
        }
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionRepository for InMemoryQuestionBank {
    fn get_all(&self) -> Vec<Question> {
        self.questions.clone()
    }

    fn get_by_topic(&self, topic_id: u8) -> Vec<Question> {
        self.questions
            .iter()
            .filter(|q| q.topic == topic_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, topic: u8) -> Question {
        Question {
            id: id.to_string(),
            topic,
            prompt: "Which branch ratifies treaties?".to_string(),
            options: vec!["House".to_string(), "Senate".to_string()],
            correct_index: 1,
            explanation: None,
        }
    }

    #[test]
    fn test_bank_filters_invalid_questions() {
        let mut bad = question("q-bad", 2);
        bad.correct_index = 5;
        let bank = InMemoryQuestionBank::new(vec![question("q1", 1), bad]);
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.get_all()[0].id, "q1");
    }

    #[test]
    fn test_get_by_topic_filters() {
        let bank =
            InMemoryQuestionBank::new(vec![question("q1", 1), question("q2", 2), question("q3", 2)]);
        assert_eq!(bank.get_by_topic(2).len(), 2);
        assert!(bank.get_by_topic(4).is_empty());
    }

    #[test]
    fn test_structural_validity_bounds() {
        let mut q = question("q1", 1);
        assert!(q.is_structurally_valid());
        q.options = vec!["only one".to_string()];
        q.correct_index = 0;
        assert!(!q.is_structurally_valid());
    }
}
