use lesson_core::model::{
    AnswerSheet, Attempt, AttemptId, AttemptScore, LessonId, QuestionId, Quiz, QuizId,
    StartedAttempt,
};
use lesson_core::scoring::LessonScore;
use storage::repository::StorageError;

/// Where the learner is in the lesson's quiz sequence.
///
/// `Starting` and `Submitting` mark the two learner-triggered requests in
/// flight; no other state has an outstanding call except `Loading`.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Locked,
    Loading,
    NoQuizRequired,
    ReadyToStart { index: usize },
    Starting { index: usize },
    InQuiz { index: usize, attempt_id: AttemptId },
    Submitting { index: usize, attempt_id: AttemptId },
    Finished(LessonScore),
}

impl FlowState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Locked => "locked",
            FlowState::Loading => "loading",
            FlowState::NoQuizRequired => "no quiz required",
            FlowState::ReadyToStart { .. } => "ready to start",
            FlowState::Starting { .. } => "starting",
            FlowState::InQuiz { .. } => "in quiz",
            FlowState::Submitting { .. } => "submitting",
            FlowState::Finished(_) => "finished",
        }
    }

    /// Index of the quiz this state refers to, if any.
    #[must_use]
    pub fn quiz_index(&self) -> Option<usize> {
        match self {
            FlowState::ReadyToStart { index }
            | FlowState::Starting { index }
            | FlowState::InQuiz { index, .. }
            | FlowState::Submitting { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Identifies which lesson and load generation a request belongs to.
///
/// Results carrying a ticket that is no longer current are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub lesson_id: LessonId,
    pub generation: u64,
}

/// Work the machine asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEffect {
    /// Fetch the lesson's quizzes and the learner's attempts, concurrently.
    Load { ticket: Ticket, lesson_id: LessonId },
    StartAttempt { ticket: Ticket, quiz_id: QuizId },
    SubmitAttempt {
        ticket: Ticket,
        attempt_id: AttemptId,
        answers: AnswerSheet,
    },
    NavigateNext { lesson_id: LessonId },
}

/// Everything that can happen to the flow: external inputs, learner actions
/// and results of effects.
#[derive(Debug)]
pub enum FlowEvent {
    VideoGateChanged(bool),
    LastLessonChanged(bool),
    Reload,
    QuizzesLoaded { ticket: Ticket, quizzes: Vec<Quiz> },
    HistoryLoaded { ticket: Ticket, attempts: Vec<Attempt> },
    LoadFailed { ticket: Ticket, error: StorageError },
    StartRequested,
    AttemptStarted { ticket: Ticket, started: StartedAttempt },
    StartFailed { ticket: Ticket, error: StorageError },
    AnswerSelected { question_id: QuestionId, option: String },
    SubmitRequested,
    AttemptSubmitted { ticket: Ticket, result: AttemptScore },
    SubmitFailed { ticket: Ticket, error: StorageError },
    RetryRequested,
    ProceedRequested,
}
