//! Shared error types for the services crate.

use thiserror::Error;

use lesson_core::model::QuestionId;
use storage::repository::StorageError;

/// Errors emitted by the quiz flow controller.
///
/// Store failures are transient: the controller stays where it was and the
/// learner may repeat the action. Everything else is a local rejection that
/// never reaches the store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    #[error("quizzes are locked until the lesson video has been watched")]
    Locked,
    #[error("cannot {action} while {state}")]
    InvalidAction {
        action: &'static str,
        state: &'static str,
    },
    #[error("{missing} question(s) still need an answer")]
    IncompleteAnswers { missing: usize },
    #[error("the active quiz has no questions to answer")]
    EmptyQuiz,
    #[error("question {0} is not part of the active quiz")]
    UnknownQuestion(QuestionId),
    #[error("question {0} does not offer that option")]
    UnknownOption(QuestionId),
    #[error("the next lesson is not available")]
    ProceedUnavailable,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while configuring the HTTP attempt store client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiConfigError {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}
