//! Resume and scoring rules for a lesson's quiz sequence.
//!
//! Two aggregation paths exist and are mutually exclusive per result:
//! - **Session**: quizzes finished during the current traversal are pooled
//!   into one correct/total ratio, so longer quizzes weigh more.
//! - **Historical**: when nothing was taken this traversal, each quiz's most
//!   recent completed attempt contributes its score and the scores are averaged.

use std::collections::HashSet;

use crate::model::{Attempt, AttemptScore, Quiz, QuizId};

/// Minimum lesson score labelled as a pass.
pub const PASS_THRESHOLD: f64 = 60.0;

/// Minimum lesson score that unlocks the next lesson.
pub const ADVANCE_THRESHOLD: f64 = 80.0;

//
// ─── SESSION STATS ─────────────────────────────────────────────────────────────
//

/// Result of one quiz submitted during the current traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStat {
    pub quiz_id: QuizId,
    pub score: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
}

impl SessionStat {
    #[must_use]
    pub fn from_score(quiz_id: QuizId, result: &AttemptScore) -> Self {
        Self {
            quiz_id,
            score: result.score(),
            correct_answers: result.correct_answers(),
            total_questions: result.total_questions(),
        }
    }
}

//
// ─── RESUME ────────────────────────────────────────────────────────────────────
//

/// Position of the first quiz without a completed attempt.
///
/// Returns `None` when every quiz already has one. Attempts for quizzes that
/// are not part of `quizzes` are ignored.
#[must_use]
pub fn resume_index(quizzes: &[Quiz], attempts: &[Attempt]) -> Option<usize> {
    let completed: HashSet<QuizId> = attempts
        .iter()
        .filter(|attempt| attempt.is_completed())
        .map(Attempt::quiz_id)
        .collect();
    quizzes.iter().position(|quiz| !completed.contains(&quiz.id()))
}

/// Most recent completed attempt: later `completed_at` first, then higher id.
///
/// A missing timestamp sorts before any present one.
pub fn latest_attempt<'a, I>(attempts: I) -> Option<&'a Attempt>
where
    I: IntoIterator<Item = &'a Attempt>,
{
    attempts
        .into_iter()
        .filter(|attempt| attempt.is_completed())
        .max_by_key(|attempt| (attempt.completed_at(), attempt.id()))
}

//
// ─── AGGREGATION ───────────────────────────────────────────────────────────────
//

/// Pooled ratio over every quiz submitted this traversal.
///
/// Not a mean of per-quiz percentages. Returns `0.0` when no questions were asked.
#[must_use]
pub fn session_score(stats: &[SessionStat]) -> f64 {
    let (correct, total) = stats.iter().fold((0_u64, 0_u64), |(c, t), stat| {
        (
            c + u64::from(stat.correct_answers),
            t + u64::from(stat.total_questions),
        )
    });
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = correct as f64 / total as f64;
    100.0 * ratio
}

/// Mean of each quiz's latest completed attempt score, one value per quiz.
///
/// Quizzes without a completed attempt are left out; a completed attempt
/// without a score counts as 0.
#[must_use]
pub fn historical_score(quizzes: &[Quiz], attempts: &[Attempt]) -> f64 {
    let scores: Vec<f64> = quizzes
        .iter()
        .filter_map(|quiz| {
            latest_attempt(attempts.iter().filter(|a| a.quiz_id() == quiz.id()))
                .map(|attempt| attempt.score().unwrap_or(0.0))
        })
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = scores.len() as f64;
    scores.iter().sum::<f64>() / count
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPath {
    Session,
    Historical,
}

/// Cosmetic label shown with a finished lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    GoodJob,
    QuizCompleted,
}

impl Verdict {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Verdict::GoodJob => "Good Job",
            Verdict::QuizCompleted => "Quiz Completed",
        }
    }
}

/// Final score of a lesson's quiz sequence and how it was computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LessonScore {
    pub score: f64,
    pub path: AggregationPath,
}

impl LessonScore {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.score >= PASS_THRESHOLD
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.passed() {
            Verdict::GoodJob
        } else {
            Verdict::QuizCompleted
        }
    }

    #[must_use]
    pub fn advance_eligible(&self, is_last_lesson: bool) -> bool {
        self.score >= ADVANCE_THRESHOLD && !is_last_lesson
    }
}

/// Session path when anything was submitted this traversal, historical otherwise.
#[must_use]
pub fn aggregate(stats: &[SessionStat], quizzes: &[Quiz], attempts: &[Attempt]) -> LessonScore {
    if stats.is_empty() {
        LessonScore {
            score: historical_score(quizzes, attempts),
            path: AggregationPath::Historical,
        }
    } else {
        LessonScore {
            score: session_score(stats),
            path: AggregationPath::Session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttemptId, Question, QuestionId};
    use crate::time::fixed_minutes;
    use std::collections::BTreeMap;

    fn quiz(id: u64) -> Quiz {
        Quiz::new(
            QuizId::new(id),
            format!("Quiz {id}"),
            vec![Question::new(
                QuestionId::new(id * 10),
                "Q",
                vec!["a".into(), "b".into()],
            )],
        )
    }

    fn done(id: u64, quiz_id: u64, minute: i64, score: f64) -> Attempt {
        Attempt::from_persisted(
            AttemptId::new(id),
            QuizId::new(quiz_id),
            fixed_minutes(minute - 1),
            Some(fixed_minutes(minute)),
            Some(score),
            0,
            0,
            BTreeMap::new(),
        )
    }

    fn open(id: u64, quiz_id: u64) -> Attempt {
        Attempt::in_progress(AttemptId::new(id), QuizId::new(quiz_id), fixed_minutes(0))
    }

    fn stat(correct: u32, total: u32) -> SessionStat {
        SessionStat::from_score(
            QuizId::new(1),
            &AttemptScore::from_counts(correct, total).unwrap(),
        )
    }

    #[test]
    fn resume_points_at_first_incomplete_quiz() {
        let quizzes = vec![quiz(1), quiz(2), quiz(3)];
        let attempts = vec![done(1, 1, 1, 90.0), open(2, 2), done(3, 3, 2, 50.0)];
        assert_eq!(resume_index(&quizzes, &attempts), Some(1));
    }

    #[test]
    fn resume_is_none_when_everything_is_complete() {
        let quizzes = vec![quiz(1), quiz(2)];
        let attempts = vec![done(1, 1, 1, 90.0), done(2, 2, 2, 70.0)];
        assert_eq!(resume_index(&quizzes, &attempts), None);
    }

    #[test]
    fn resume_ignores_other_lessons() {
        let quizzes = vec![quiz(1)];
        let attempts = vec![done(1, 77, 1, 100.0)];
        assert_eq!(resume_index(&quizzes, &attempts), Some(0));
    }

    #[test]
    fn session_score_pools_questions_instead_of_averaging() {
        let stats = vec![stat(2, 2), stat(1, 8)];
        let score = session_score(&stats);
        assert!((score - 30.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn session_score_with_no_questions_is_zero() {
        assert!(session_score(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn historical_score_is_mean_of_latest_per_quiz() {
        let quizzes = vec![quiz(1), quiz(2)];
        let attempts = vec![
            done(1, 1, 1, 20.0),
            done(2, 1, 5, 80.0),
            done(3, 2, 3, 100.0),
            done(4, 2, 4, 40.0),
        ];
        let score = historical_score(&quizzes, &attempts);
        assert!((score - 60.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn latest_attempt_breaks_timestamp_ties_by_id() {
        let attempts = vec![done(9, 1, 3, 10.0), done(4, 1, 3, 90.0)];
        assert_eq!(latest_attempt(&attempts).map(Attempt::id), Some(AttemptId::new(9)));
    }

    #[test]
    fn latest_attempt_skips_in_progress_attempts() {
        let attempts = vec![done(1, 1, 3, 75.0), open(5, 1)];
        assert_eq!(latest_attempt(&attempts).map(Attempt::id), Some(AttemptId::new(1)));
    }

    #[test]
    fn aggregate_prefers_session_stats() {
        let quizzes = vec![quiz(1)];
        let attempts = vec![done(1, 1, 1, 100.0)];

        let session = aggregate(&[stat(1, 4)], &quizzes, &attempts);
        assert_eq!(session.path, AggregationPath::Session);
        assert!((session.score - 25.0).abs() < 1e-9);

        let historical = aggregate(&[], &quizzes, &attempts);
        assert_eq!(historical.path, AggregationPath::Historical);
        assert!((historical.score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn advance_requires_threshold_and_a_next_lesson() {
        let almost = LessonScore {
            score: 79.999,
            path: AggregationPath::Session,
        };
        assert!(!almost.advance_eligible(false));
        assert!(!almost.advance_eligible(true));

        let enough = LessonScore {
            score: 80.0,
            path: AggregationPath::Historical,
        };
        assert!(enough.advance_eligible(false));
        assert!(!enough.advance_eligible(true));
    }

    #[test]
    fn verdict_flips_at_pass_threshold() {
        let below = LessonScore {
            score: 59.9,
            path: AggregationPath::Session,
        };
        let at = LessonScore {
            score: 60.0,
            path: AggregationPath::Session,
        };
        assert_eq!(below.verdict(), Verdict::QuizCompleted);
        assert_eq!(at.verdict().label(), "Good Job");
    }
}
