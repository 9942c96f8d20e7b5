use std::sync::Mutex;

use lesson_core::model::LessonId;

/// Receives the learner's request to move on to the next lesson.
pub trait NavigationTrigger: Send + Sync {
    fn advance_requested(&self, lesson_id: LessonId);
}

/// Drops every request. For hosts without a lesson sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNavigation;

impl NavigationTrigger for NoNavigation {
    fn advance_requested(&self, lesson_id: LessonId) {
        tracing::debug!(%lesson_id, "advance requested with no navigation attached");
    }
}

/// Remembers every lesson the learner asked to leave, in order.
#[derive(Debug, Default)]
pub struct RecordingNavigation {
    requests: Mutex<Vec<LessonId>>,
}

impl RecordingNavigation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<LessonId> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl NavigationTrigger for RecordingNavigation {
    fn advance_requested(&self, lesson_id: LessonId) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(lesson_id);
        }
    }
}
