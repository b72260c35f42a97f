use log::warn;
use serde::{Deserialize, Serialize};

/// One step of the percentage -> estimated AP grade mapping.
///
/// Cutoffs are an estimation heuristic reconstructed from practice data, not
/// an official College Board mapping, so they live in configuration instead
/// of being hard-coded.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct GradeCutoff {
    pub min_percentage: u8,
    pub grade: u8,
}

/// Tunables for the quiz session engine.
///
/// Every value has a sensible default; `from_env` lets embedders override
/// scalars through `QUIZMATE_*` environment variables.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of curriculum units questions are tagged with (units 1..=n).
    pub topic_count: u8,
    /// Target question count for a full practice exam.
    pub exam_question_count: usize,
    /// Countdown length for a full practice exam.
    pub exam_duration_minutes: u64,
    /// Default question count for a single-topic session.
    pub topic_question_count: usize,
    /// Initial batch size for an open study session.
    pub open_study_batch_size: usize,
    /// Minute marks at which the timer raises a warning, each at most once.
    pub warning_thresholds_minutes: Vec<u64>,
    /// Percentage -> AP grade steps, highest cutoff first.
    pub grade_cutoffs: Vec<GradeCutoff>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            topic_count: 5,
            exam_question_count: 55,
            // AP Gov MCQ section length.
            exam_duration_minutes: 80,
            topic_question_count: 10,
            open_study_batch_size: 5,
            warning_thresholds_minutes: vec![30, 15, 5, 1],
            grade_cutoffs: vec![
                GradeCutoff { min_percentage: 85, grade: 5 },
                GradeCutoff { min_percentage: 70, grade: 4 },
                GradeCutoff { min_percentage: 55, grade: 3 },
                GradeCutoff { min_percentage: 35, grade: 2 },
            ],
        }
    }
}

impl EngineConfig {
    /// Loads defaults merged with `QUIZMATE_*` environment overrides,
    /// e.g. `QUIZMATE_EXAM_DURATION_MINUTES=45`.
    ///
    /// A malformed environment never fails session startup: the error is
    /// logged and the defaults are used as-is.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base = match config::Config::try_from(&defaults) {
            Ok(base) => base,
            Err(e) => {
                warn!("Failed to seed config defaults: {e}");
                return defaults;
            }
        };

        let loaded = config::Config::builder()
            .add_source(base)
            .add_source(config::Environment::with_prefix("QUIZMATE").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<EngineConfig>());

        match loaded {
            Ok(cfg) => cfg.normalized(),
            Err(e) => {
                warn!("Invalid QUIZMATE_* environment override, using defaults: {e}");
                defaults
            }
        }
    }

    /// Clamps out-of-range values and keeps the grade mapping monotonic and
    /// total (every percentage 0-100 maps to some grade).
    pub fn normalized(mut self) -> Self {
        if self.topic_count == 0 {
            warn!("topic_count of 0 is not usable, clamping to 1");
            self.topic_count = 1;
        }
        if self.open_study_batch_size == 0 {
            self.open_study_batch_size = 1;
        }
        self.grade_cutoffs
            .sort_by(|a, b| b.min_percentage.cmp(&a.min_percentage));
        self.grade_cutoffs.dedup_by_key(|c| c.min_percentage);
        self
    }
}
