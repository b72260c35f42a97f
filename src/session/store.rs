use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::quiz::scoring::TopicBreakdown;

/// Failures a persistence backend may raise. All of them are non-fatal to
/// the engine: the in-memory session stays the source of truth.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),
}

/// Lifetime per-topic tallies, accumulated across completed sessions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TopicStats {
    pub correct: u64,
    pub total: u64,
}

/// One completed full exam, kept for longitudinal trend analysis.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExamRecord {
    pub correct: u32,
    pub total: u32,
    pub percentage: u8,
    pub per_topic_breakdown: Vec<TopicBreakdown>,
    pub recorded_at: DateTime<Utc>,
}

/// Session persistence port. The payload is the engine's serialized session
/// and is opaque here; implementations store and return it unchanged.
///
/// `save_current` returning `Ok(false)` means the backend declined the write
/// (quota); the engine reports it and carries on in memory.
pub trait SessionStore: Send + Sync {
    fn save_current(&self, payload: &Value) -> Result<bool, StoreError>;
    fn load_current(&self) -> Result<Option<Value>, StoreError>;
    fn clear_current(&self) -> Result<(), StoreError>;
    fn update_topic_stats(&self, topic_id: u8, correct: u32, total: u32)
        -> Result<(), StoreError>;
    fn record_completed_exam(
        &self,
        correct: u32,
        total: u32,
        per_topic_breakdown: &[TopicBreakdown],
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
struct StoreInner {
    current: Option<Value>,
    topic_stats: HashMap<u8, TopicStats>,
    exam_history: Vec<ExamRecord>,
}

/// Reference store: everything in memory behind a mutex. Doubles as the test
/// harness backend; `set_fail_writes` simulates a degraded backend.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<StoreInner>,
    fail_writes: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every write reports `Unavailable`, the way a full or
    /// detached browser storage would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn topic_stats(&self) -> HashMap<u8, TopicStats> {
        self.inner.lock().topic_stats.clone()
    }

    pub fn exam_history(&self) -> Vec<ExamRecord> {
        self.inner.lock().exam_history.clone()
    }

    /// Exam percentages oldest-first, the shape `performance_trend` wants.
    pub fn exam_percentages(&self) -> Vec<u8> {
        self.inner
            .lock()
            .exam_history
            .iter()
            .map(|r| r.percentage)
            .collect()
    }

    /// Test hook: plant an arbitrary payload as the saved session.
    pub fn seed_current(&self, payload: Value) {
        self.inner.lock().current = Some(payload);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn save_current(&self, payload: &Value) -> Result<bool, StoreError> {
        self.check_writable()?;
        self.inner.lock().current = Some(payload.clone());
        Ok(true)
    }

    fn load_current(&self) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.lock().current.clone())
    }

    fn clear_current(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.lock().current = None;
        Ok(())
    }

    fn update_topic_stats(
        &self,
        topic_id: u8,
        correct: u32,
        total: u32,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        let stats = inner.topic_stats.entry(topic_id).or_default();
        stats.correct += u64::from(correct);
        stats.total += u64::from(total);
        Ok(())
    }

    fn record_completed_exam(
        &self,
        correct: u32,
        total: u32,
        per_topic_breakdown: &[TopicBreakdown],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let percentage = if total == 0 {
            0
        } else {
            ((f64::from(correct) * 100.0) / f64::from(total)).round() as u8
        };
        self.inner.lock().exam_history.push(ExamRecord {
            correct,
            total,
            percentage,
            per_topic_breakdown: per_topic_breakdown.to_vec(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}
