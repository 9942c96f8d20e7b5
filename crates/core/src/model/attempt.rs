use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::ids::{AttemptId, QuestionId, QuizId};
use crate::model::quiz::Question;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ScoreError {
    #[error("score must be within 0..=100, got {0}")]
    OutOfRange(f64),

    #[error("correct answers ({correct}) exceed total questions ({total})")]
    CountMismatch { correct: u32, total: u32 },
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Server-computed result of a submitted attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptScore {
    score: f64,
    correct_answers: u32,
    total_questions: u32,
}

impl AttemptScore {
    /// Build a score as reported by the attempt store.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::OutOfRange` for a non-finite score or one outside `0..=100`,
    /// and `ScoreError::CountMismatch` when more answers are correct than were asked.
    pub fn new(score: f64, correct_answers: u32, total_questions: u32) -> Result<Self, ScoreError> {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(ScoreError::OutOfRange(score));
        }
        if correct_answers > total_questions {
            return Err(ScoreError::CountMismatch {
                correct: correct_answers,
                total: total_questions,
            });
        }
        Ok(Self {
            score,
            correct_answers,
            total_questions,
        })
    }

    /// Derive the percentage from raw counts. An empty quiz scores 0.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::CountMismatch` if `correct_answers > total_questions`.
    pub fn from_counts(correct_answers: u32, total_questions: u32) -> Result<Self, ScoreError> {
        let score = if total_questions == 0 {
            0.0
        } else {
            100.0 * f64::from(correct_answers) / f64::from(total_questions)
        };
        Self::new(score, correct_answers, total_questions)
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One learner's run through a quiz, as recorded by the attempt store.
///
/// An attempt without `completed_at` is in progress. The controller never
/// mutates attempts; it only reads them back from history.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    id: AttemptId,
    quiz_id: QuizId,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    score: Option<f64>,
    correct_answers: u32,
    total_questions: u32,
    answers: BTreeMap<QuestionId, String>,
}

impl Attempt {
    /// A freshly started attempt with no answers.
    #[must_use]
    pub fn in_progress(id: AttemptId, quiz_id: QuizId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            quiz_id,
            started_at,
            completed_at: None,
            score: None,
            correct_answers: 0,
            total_questions: 0,
            answers: BTreeMap::new(),
        }
    }

    /// A finished attempt carrying its graded result.
    #[must_use]
    pub fn completed(
        id: AttemptId,
        quiz_id: QuizId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        result: AttemptScore,
    ) -> Self {
        Self {
            id,
            quiz_id,
            started_at,
            completed_at: Some(completed_at),
            score: Some(result.score()),
            correct_answers: result.correct_answers(),
            total_questions: result.total_questions(),
            answers: BTreeMap::new(),
        }
    }

    /// Rehydrate an attempt exactly as stored, without validation.
    ///
    /// History is read-only input; inconsistent rows are tolerated and judged
    /// by `is_completed` alone.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: AttemptId,
        quiz_id: QuizId,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        score: Option<f64>,
        correct_answers: u32,
        total_questions: u32,
        answers: BTreeMap<QuestionId, String>,
    ) -> Self {
        Self {
            id,
            quiz_id,
            started_at,
            completed_at,
            score,
            correct_answers,
            total_questions,
            answers,
        }
    }

    #[must_use]
    pub fn with_answers(mut self, answers: BTreeMap<QuestionId, String>) -> Self {
        self.answers = answers;
        self
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, String> {
        &self.answers
    }

    /// A quiz counts as done once any attempt has a completion time or a score.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some() || self.score.is_some()
    }
}

/// Returned by the store when an attempt is opened: the new attempt id plus
/// the questions to present, in the order to present them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedAttempt {
    pub attempt_id: AttemptId,
    pub quiz_id: QuizId,
    pub questions: Vec<Question>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn score_rejects_out_of_range_values() {
        assert!(matches!(
            AttemptScore::new(100.5, 1, 1),
            Err(ScoreError::OutOfRange(_))
        ));
        assert!(matches!(
            AttemptScore::new(f64::NAN, 0, 1),
            Err(ScoreError::OutOfRange(_))
        ));
    }

    #[test]
    fn score_rejects_more_correct_than_total() {
        let err = AttemptScore::new(50.0, 3, 2).unwrap_err();
        assert_eq!(err, ScoreError::CountMismatch { correct: 3, total: 2 });
    }

    #[test]
    fn from_counts_computes_percentage() {
        let score = AttemptScore::from_counts(1, 8).unwrap();
        assert!((score.score() - 12.5).abs() < f64::EPSILON);

        let empty = AttemptScore::from_counts(0, 0).unwrap();
        assert!(empty.score().abs() < f64::EPSILON);
    }

    #[test]
    fn completion_is_timestamp_or_score() {
        let now = fixed_now();
        let open = Attempt::in_progress(AttemptId::new(1), QuizId::new(1), now);
        assert!(!open.is_completed());

        let scored_only = Attempt::from_persisted(
            AttemptId::new(2),
            QuizId::new(1),
            now,
            None,
            Some(40.0),
            2,
            5,
            BTreeMap::new(),
        );
        assert!(scored_only.is_completed());

        let done = Attempt::completed(
            AttemptId::new(3),
            QuizId::new(1),
            now,
            now,
            AttemptScore::from_counts(1, 2).unwrap(),
        );
        assert!(done.is_completed());
        assert_eq!(done.score(), Some(50.0));
    }
}
