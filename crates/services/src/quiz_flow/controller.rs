use std::collections::VecDeque;
use std::sync::Arc;

use lesson_core::model::{LessonId, QuestionId};
use storage::repository::{AttemptRepository, QuizRepository, Storage};

use super::machine::FlowMachine;
use super::navigation::NavigationTrigger;
use super::state::{FlowEffect, FlowEvent};
use super::view::FlowSnapshot;
use crate::error::FlowError;

/// Drives a [`FlowMachine`] against the attempt store.
///
/// Each public operation dispatches one event and then runs the effects it
/// produces, feeding results back in, until the machine settles.
pub struct QuizFlowController {
    machine: FlowMachine,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    navigation: Arc<dyn NavigationTrigger>,
}

impl QuizFlowController {
    #[must_use]
    pub fn new(
        lesson_id: LessonId,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        navigation: Arc<dyn NavigationTrigger>,
    ) -> Self {
        Self {
            machine: FlowMachine::new(lesson_id),
            quizzes,
            attempts,
            navigation,
        }
    }

    #[must_use]
    pub fn from_storage(
        lesson_id: LessonId,
        storage: &Storage,
        navigation: Arc<dyn NavigationTrigger>,
    ) -> Self {
        Self::new(
            lesson_id,
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            navigation,
        )
    }

    #[must_use]
    pub fn machine(&self) -> &FlowMachine {
        &self.machine
    }

    #[must_use]
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot::from_machine(&self.machine)
    }

    /// Feed the video gate. Opening it loads quizzes and history.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` if loading fails; the flow stays in `Loading`.
    pub async fn set_video_completed(&mut self, completed: bool) -> Result<(), FlowError> {
        self.send(FlowEvent::VideoGateChanged(completed)).await
    }

    /// Whether this lesson is the last of its course. Gates "proceed".
    pub fn set_last_lesson(&mut self, is_last: bool) {
        if let Err(err) = self.machine.dispatch(FlowEvent::LastLessonChanged(is_last)) {
            tracing::warn!(%err, "last-lesson flag rejected");
        }
    }

    /// Switch to another lesson. The flow starts over, locked.
    pub fn set_lesson(&mut self, lesson_id: LessonId) {
        if lesson_id != self.machine.lesson_id() {
            self.machine.set_lesson(lesson_id);
        }
    }

    /// Load again, e.g. after a failed fetch.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Locked` before the video is watched, or the load failure.
    pub async fn initialize(&mut self) -> Result<(), FlowError> {
        self.send(FlowEvent::Reload).await
    }

    /// Open an attempt for the quiz the learner is ready to take.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` if no quiz is ready or the store rejects the start.
    pub async fn start(&mut self) -> Result<(), FlowError> {
        self.send(FlowEvent::StartRequested).await
    }

    /// Record an answer locally. Nothing is sent until [`Self::submit`].
    ///
    /// # Errors
    ///
    /// Returns `FlowError` for unknown questions or options, or outside a quiz.
    pub async fn select_answer(
        &mut self,
        question_id: QuestionId,
        option: impl Into<String>,
    ) -> Result<(), FlowError> {
        self.send(FlowEvent::AnswerSelected {
            question_id,
            option: option.into(),
        })
        .await
    }

    /// Submit the active quiz. On success the next quiz opens right away.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::IncompleteAnswers` without contacting the store
    /// when a question is unanswered, or the store's failure.
    pub async fn submit(&mut self) -> Result<(), FlowError> {
        self.send(FlowEvent::SubmitRequested).await
    }

    /// Restart the whole lesson from the first quiz.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` outside `Finished` or if the first start fails.
    pub async fn retry(&mut self) -> Result<(), FlowError> {
        self.send(FlowEvent::RetryRequested).await
    }

    /// Ask the host to navigate to the next lesson.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::ProceedUnavailable` when the lesson is the last one
    /// or the score is below the advance threshold.
    pub async fn proceed(&mut self) -> Result<(), FlowError> {
        self.send(FlowEvent::ProceedRequested).await
    }

    async fn send(&mut self, event: FlowEvent) -> Result<(), FlowError> {
        let effects = self.machine.dispatch(event)?;
        self.run(effects).await
    }

    async fn run(&mut self, effects: Vec<FlowEffect>) -> Result<(), FlowError> {
        let mut queue = VecDeque::from(effects);
        let mut first_error = None;

        while let Some(effect) = queue.pop_front() {
            for event in self.perform(effect).await {
                match self.machine.dispatch(event) {
                    Ok(more) => queue.extend(more),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn perform(&self, effect: FlowEffect) -> Vec<FlowEvent> {
        match effect {
            FlowEffect::Load { ticket, lesson_id } => {
                let (quizzes, attempts) = tokio::join!(
                    self.quizzes.list_quizzes(lesson_id),
                    self.attempts.list_user_attempts()
                );
                let mut events = Vec::with_capacity(2);
                let mut failures = Vec::new();
                match quizzes {
                    Ok(quizzes) => events.push(FlowEvent::QuizzesLoaded { ticket, quizzes }),
                    Err(error) => failures.push(FlowEvent::LoadFailed { ticket, error }),
                }
                match attempts {
                    Ok(attempts) => events.push(FlowEvent::HistoryLoaded { ticket, attempts }),
                    Err(error) => failures.push(FlowEvent::LoadFailed { ticket, error }),
                }
                events.extend(failures);
                events
            }
            FlowEffect::StartAttempt { ticket, quiz_id } => {
                match self.attempts.start_attempt(quiz_id).await {
                    Ok(started) => vec![FlowEvent::AttemptStarted { ticket, started }],
                    Err(error) => vec![FlowEvent::StartFailed { ticket, error }],
                }
            }
            FlowEffect::SubmitAttempt {
                ticket,
                attempt_id,
                answers,
            } => match self.attempts.submit_attempt(attempt_id, &answers).await {
                Ok(result) => vec![FlowEvent::AttemptSubmitted { ticket, result }],
                Err(error) => vec![FlowEvent::SubmitFailed { ticket, error }],
            },
            FlowEffect::NavigateNext { lesson_id } => {
                self.navigation.advance_requested(lesson_id);
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for QuizFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizFlowController")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}
