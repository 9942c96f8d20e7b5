use lesson_core::model::{AnswerSheet, Question};
use lesson_core::scoring::{AggregationPath, Verdict};

use super::machine::FlowMachine;
use super::state::FlowState;

/// How far the learner is through the lesson's quizzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowProgress {
    pub completed: usize,
    pub total: usize,
}

impl FlowProgress {
    /// Share of quizzes completed, 0-100. An empty lesson counts as done.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.completed as f64 / self.total as f64;
        100.0 * ratio
    }
}

/// What the result screen shows once every quiz is done.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalResult {
    pub score: f64,
    pub path: AggregationPath,
    pub passed: bool,
    pub verdict: Verdict,
    pub can_retry: bool,
    pub can_proceed: bool,
}

/// Render state for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub current_quiz_index: usize,
    pub quiz_count: usize,
    pub current_questions: Vec<Question>,
    pub answers: AnswerSheet,
    pub progress: FlowProgress,
    pub final_result: Option<FinalResult>,
    /// Whether the "proceed" control should be offered.
    pub can_proceed: bool,
    pub error: Option<String>,
}

impl FlowSnapshot {
    #[must_use]
    pub fn from_machine(machine: &FlowMachine) -> Self {
        let quiz_count = machine.quizzes().len();
        let completed = match machine.state() {
            FlowState::Finished(_) => quiz_count,
            FlowState::ReadyToStart { index }
            | FlowState::Starting { index }
            | FlowState::InQuiz { index, .. }
            | FlowState::Submitting { index, .. } => *index,
            _ => 0,
        };
        let final_result = match machine.state() {
            FlowState::Finished(score) => Some(FinalResult {
                score: score.score,
                path: score.path,
                passed: score.passed(),
                verdict: score.verdict(),
                can_retry: true,
                can_proceed: machine.can_proceed(),
            }),
            _ => None,
        };

        Self {
            state: machine.state().clone(),
            current_quiz_index: machine.current_index(),
            quiz_count,
            current_questions: machine.current_questions().to_vec(),
            answers: machine.answers().clone(),
            progress: FlowProgress {
                completed,
                total: quiz_count,
            },
            final_result,
            can_proceed: machine.can_proceed(),
            error: machine.last_error().map(str::to_owned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_counts_completed_quizzes() {
        let progress = FlowProgress {
            completed: 1,
            total: 4,
        };
        assert!((progress.percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn empty_lesson_is_fully_done() {
        let progress = FlowProgress {
            completed: 0,
            total: 0,
        };
        assert!((progress.percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn locked_machine_has_no_result() {
        let machine = FlowMachine::new(lesson_core::model::LessonId::new(1));
        let snapshot = FlowSnapshot::from_machine(&machine);
        assert_eq!(snapshot.state, FlowState::Locked);
        assert_eq!(snapshot.quiz_count, 0);
        assert!(snapshot.final_result.is_none());
        assert!(!snapshot.can_proceed);
        assert!(snapshot.error.is_none());
    }
}
