use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::GradeCutoff;
use crate::session::SessionMode;

use super::answers::AnswerRecord;
use super::questions::Question;

/// Qualitative bucket for a percentage score. Boundaries are inclusive-lower
/// and evaluated top-down.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Excellent,
    Good,
    Satisfactory,
    NeedsImprovement,
    NeedsSignificantImprovement,
}

pub fn performance_tier(percentage: u8) -> PerformanceTier {
    match percentage {
        90..=u8::MAX => PerformanceTier::Excellent,
        80..=89 => PerformanceTier::Good,
        70..=79 => PerformanceTier::Satisfactory,
        60..=69 => PerformanceTier::NeedsImprovement,
        _ => PerformanceTier::NeedsSignificantImprovement,
    }
}

/// Per-topic tallies among *answered* questions. Topics with nothing
/// answered are reported with zero totals, not omitted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TopicBreakdown {
    pub topic: u8,
    pub correct: u32,
    pub total: u32,
    pub percentage: u8,
}

/// Final multi-dimensional score for a session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ScoreResult {
    pub correct_count: u32,
    pub answered_count: u32,
    pub total_questions: u32,
    /// 0-100, rounded to nearest; forced to 0 when nothing was answered.
    pub percentage: u8,
    pub performance_tier: PerformanceTier,
    pub per_topic_breakdown: Vec<TopicBreakdown>,
    /// Estimated AP grade 1-5, full exams only.
    pub estimated_ap_grade: Option<u8>,
}

/// Scoring seam, resolved once at engine construction so alternative
/// calibrations can be swapped in without touching the session machine.
pub trait ScoringStrategy: Send + Sync {
    fn calculate(
        &self,
        questions: &[Question],
        answers: &BTreeMap<usize, AnswerRecord>,
        mode: SessionMode,
    ) -> ScoreResult;
}

/// The stock scoring rules.
pub struct StandardScoring {
    pub topic_count: u8,
    pub grade_cutoffs: Vec<GradeCutoff>,
}

impl StandardScoring {
    pub fn new(topic_count: u8, grade_cutoffs: Vec<GradeCutoff>) -> Self {
        Self {
            topic_count,
            grade_cutoffs,
        }
    }
}

impl ScoringStrategy for StandardScoring {
    fn calculate(
        &self,
        questions: &[Question],
        answers: &BTreeMap<usize, AnswerRecord>,
        mode: SessionMode,
    ) -> ScoreResult {
        // Ignore any stray record pointing past the question list.
        let answered: Vec<(&Question, &AnswerRecord)> = answers
            .iter()
            .filter_map(|(&idx, record)| questions.get(idx).map(|q| (q, record)))
            .collect();

        let answered_count = answered.len() as u32;
        let correct_count = answered.iter().filter(|(_, r)| r.is_correct).count() as u32;
        let percentage = round_percentage(correct_count, answered_count);

        let mut breakdown = Vec::with_capacity(usize::from(self.topic_count));
        for topic in 1..=self.topic_count {
            let total = answered.iter().filter(|(q, _)| q.topic == topic).count() as u32;
            let correct = answered
                .iter()
                .filter(|(q, r)| q.topic == topic && r.is_correct)
                .count() as u32;
            breakdown.push(TopicBreakdown {
                topic,
                correct,
                total,
                percentage: round_percentage(correct, total),
            });
        }

        let estimated_ap_grade = match mode {
            SessionMode::FullExam => Some(estimate_ap_grade(percentage, &self.grade_cutoffs)),
            _ => None,
        };

        ScoreResult {
            correct_count,
            answered_count,
            total_questions: questions.len() as u32,
            percentage,
            performance_tier: performance_tier(percentage),
            per_topic_breakdown: breakdown,
            estimated_ap_grade,
        }
    }
}

fn round_percentage(correct: u32, answered: u32) -> u8 {
    if answered == 0 {
        return 0;
    }
    ((f64::from(correct) * 100.0) / f64::from(answered)).round() as u8
}

/// Percentage -> estimated AP grade. Cutoffs are highest-first; the first
/// match wins and anything below the last cutoff is a 1, so the mapping is
/// total over 0-100 and monotonic as long as the cutoffs are sorted.
pub fn estimate_ap_grade(percentage: u8, cutoffs: &[GradeCutoff]) -> u8 {
    for cutoff in cutoffs {
        if percentage >= cutoff.min_percentage {
            return cutoff.grade;
        }
    }
    1
}

/// Topics split around the overall average percentage: at or above average
/// are strengths, below are weaknesses. Both lists sorted strongest-first.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TopicAnalysis {
    pub strengths: Vec<TopicBreakdown>,
    pub weaknesses: Vec<TopicBreakdown>,
}

pub fn analyze_topics(breakdown: &[TopicBreakdown]) -> TopicAnalysis {
    if breakdown.is_empty() {
        return TopicAnalysis {
            strengths: Vec::new(),
            weaknesses: Vec::new(),
        };
    }

    let average = breakdown.iter().map(|t| f64::from(t.percentage)).sum::<f64>()
        / breakdown.len() as f64;

    let mut sorted = breakdown.to_vec();
    sorted.sort_by(|a, b| b.percentage.cmp(&a.percentage));

    let (strengths, weaknesses) = sorted
        .into_iter()
        .partition(|t| f64::from(t.percentage) >= average);

    TopicAnalysis {
        strengths,
        weaknesses,
    }
}

/// Longitudinal direction of a time-ordered percentage series.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

/// Compares the mean of the most recent third against the earliest third; a
/// material margin is anything over 2 points.
pub fn performance_trend(percentages: &[u8]) -> Trend {
    if percentages.len() < 2 {
        return Trend::InsufficientData;
    }

    let third = (percentages.len() / 3).max(1);
    let earliest = mean(&percentages[..third]);
    let recent = mean(&percentages[percentages.len() - third..]);

    if recent > earliest + 2.0 {
        Trend::Improving
    } else if recent < earliest - 2.0 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn mean(values: &[u8]) -> f64 {
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}
