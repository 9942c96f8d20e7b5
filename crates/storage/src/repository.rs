use async_trait::async_trait;
use lesson_core::Clock;
use lesson_core::model::{
    AnswerSheet, Attempt, AttemptId, AttemptScore, LessonId, Quiz, QuizId, StartedAttempt,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::grading::{AnswerKey, grade};

/// Errors surfaced by attempt store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Read access to the quizzes attached to a lesson.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// List the lesson's quizzes in presentation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quizzes cannot be loaded.
    async fn list_quizzes(&self, lesson_id: LessonId) -> Result<Vec<Quiz>, StorageError>;
}

/// The learner's attempts. The store owns grading.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Every attempt of the current learner, across all lessons.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if history cannot be loaded.
    async fn list_user_attempts(&self) -> Result<Vec<Attempt>, StorageError>;

    /// Open a new attempt for a quiz. Never resumes an existing one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown quiz, or other storage errors.
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, StorageError>;

    /// Grade and close an attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown attempt and
    /// `StorageError::Conflict` if it was already submitted.
    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerSheet,
    ) -> Result<AttemptScore, StorageError>;
}

#[derive(Default)]
struct InMemoryState {
    lessons: HashMap<LessonId, Vec<QuizId>>,
    quizzes: HashMap<QuizId, (Quiz, AnswerKey)>,
    attempts: BTreeMap<AttemptId, Attempt>,
    next_attempt_id: u64,
}

/// In-memory attempt store for tests and local runs. Grades like the real store.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    clock: Clock,
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Append a quiz to a lesson (or replace it in place if the id is known).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the store lock is poisoned.
    pub fn insert_quiz(
        &self,
        lesson_id: LessonId,
        quiz: Quiz,
        key: AnswerKey,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let order = guard.lessons.entry(lesson_id).or_default();
        if !order.contains(&quiz.id()) {
            order.push(quiz.id());
        }
        guard.quizzes.insert(quiz.id(), (quiz, key));
        Ok(())
    }

    /// Seed a historical attempt, keeping generated ids above it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the store lock is poisoned.
    pub fn insert_attempt(&self, attempt: Attempt) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.next_attempt_id = guard.next_attempt_id.max(attempt.id().value());
        guard.attempts.insert(attempt.id(), attempt);
        Ok(())
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn list_quizzes(&self, lesson_id: LessonId) -> Result<Vec<Quiz>, StorageError> {
        let guard = self.lock()?;
        let Some(order) = guard.lessons.get(&lesson_id) else {
            return Ok(Vec::new());
        };
        Ok(order
            .iter()
            .filter_map(|id| guard.quizzes.get(id).map(|(quiz, _)| quiz.clone()))
            .collect())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn list_user_attempts(&self) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.attempts.values().cloned().collect())
    }

    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, StorageError> {
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let questions = guard
            .quizzes
            .get(&quiz_id)
            .map(|(quiz, _)| quiz.questions().to_vec())
            .ok_or(StorageError::NotFound)?;

        guard.next_attempt_id += 1;
        let attempt_id = AttemptId::new(guard.next_attempt_id);
        guard
            .attempts
            .insert(attempt_id, Attempt::in_progress(attempt_id, quiz_id, now));
        tracing::debug!(%quiz_id, %attempt_id, "started attempt");

        Ok(StartedAttempt {
            attempt_id,
            quiz_id,
            questions,
        })
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerSheet,
    ) -> Result<AttemptScore, StorageError> {
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let attempt = guard
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        if attempt.is_completed() {
            return Err(StorageError::Conflict);
        }

        let (quiz, key) = guard
            .quizzes
            .get(&attempt.quiz_id())
            .ok_or(StorageError::NotFound)?;
        let result = grade(quiz.questions(), key, answers)?;

        let finished = Attempt::completed(
            attempt_id,
            attempt.quiz_id(),
            attempt.started_at(),
            now,
            result,
        )
        .with_answers(answers.as_map().clone());
        guard.attempts.insert(attempt_id, finished);
        tracing::debug!(%attempt_id, score = result.score(), "graded attempt");

        Ok(result)
    }
}

/// Quiz and attempt repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: QuizRepository + AttemptRepository + Clone + 'static,
    {
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo);
        Self { quizzes, attempts }
    }
}
