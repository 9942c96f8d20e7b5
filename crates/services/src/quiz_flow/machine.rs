use std::collections::HashSet;

use lesson_core::model::{
    AnswerSheet, Attempt, AttemptScore, LessonId, Question, QuestionId, Quiz, QuizId,
    StartedAttempt,
};
use lesson_core::scoring::{self, LessonScore, SessionStat};
use storage::repository::StorageError;

use super::state::{FlowEffect, FlowEvent, FlowState, Ticket};
use crate::error::FlowError;

/// The quiz flow of one lesson as a single reducer.
///
/// All transitions go through [`FlowMachine::dispatch`]. The machine performs
/// no I/O: it returns [`FlowEffect`]s for a driver to run and expects their
/// results back as events tagged with the [`Ticket`] they were issued under.
#[derive(Debug)]
pub struct FlowMachine {
    lesson_id: LessonId,
    generation: u64,
    video_completed: bool,
    is_last_lesson: bool,
    state: FlowState,

    pending_quizzes: Option<Vec<Quiz>>,
    pending_history: Option<Vec<Attempt>>,
    quizzes: Vec<Quiz>,
    history: Vec<Attempt>,

    current_index: usize,
    current_questions: Vec<Question>,
    answers: AnswerSheet,
    session_stats: Vec<SessionStat>,
    has_started: bool,
    finished: Option<LessonScore>,
    last_error: Option<String>,
    /// Submit still in flight when the gate closed, with the quiz index.
    detached_submit: Option<(Ticket, usize)>,
}

impl FlowMachine {
    #[must_use]
    pub fn new(lesson_id: LessonId) -> Self {
        Self::with_generation(lesson_id, 0)
    }

    fn with_generation(lesson_id: LessonId, generation: u64) -> Self {
        Self {
            lesson_id,
            generation,
            video_completed: false,
            is_last_lesson: false,
            state: FlowState::Locked,
            pending_quizzes: None,
            pending_history: None,
            quizzes: Vec::new(),
            history: Vec::new(),
            current_index: 0,
            current_questions: Vec::new(),
            answers: AnswerSheet::new(),
            session_stats: Vec::new(),
            has_started: false,
            finished: None,
            last_error: None,
            detached_submit: None,
        }
    }

    /// Discard everything and start over for another lesson.
    ///
    /// The generation keeps counting up so results still in flight for the
    /// previous lesson can never match a new ticket.
    pub fn set_lesson(&mut self, lesson_id: LessonId) {
        tracing::debug!(from = %self.lesson_id, to = %lesson_id, "lesson changed, tearing down flow");
        *self = Self::with_generation(lesson_id, self.generation + 1);
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    #[must_use]
    pub fn ticket(&self) -> Ticket {
        Ticket {
            lesson_id: self.lesson_id,
            generation: self.generation,
        }
    }

    #[must_use]
    pub fn video_completed(&self) -> bool {
        self.video_completed
    }

    #[must_use]
    pub fn is_last_lesson(&self) -> bool {
        self.is_last_lesson
    }

    #[must_use]
    pub fn quizzes(&self) -> &[Quiz] {
        &self.quizzes
    }

    /// Attempt history restricted to this lesson's quizzes.
    #[must_use]
    pub fn history(&self) -> &[Attempt] {
        &self.history
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Questions of the active attempt, empty outside `InQuiz`/`Submitting`.
    #[must_use]
    pub fn current_questions(&self) -> &[Question] {
        &self.current_questions
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    #[must_use]
    pub fn session_stats(&self) -> &[SessionStat] {
        &self.session_stats
    }

    /// Set once the learner enters a quiz in the current traversal.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.has_started
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a proceed action would currently navigate to the next lesson.
    #[must_use]
    pub fn can_proceed(&self) -> bool {
        match &self.state {
            FlowState::Finished(score) => score.advance_eligible(self.is_last_lesson),
            FlowState::NoQuizRequired => !self.is_last_lesson,
            _ => false,
        }
    }

    /// Apply one event and return the effects it requires.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` for learner actions that are rejected locally and
    /// for store failures reported through a current ticket. Results under a
    /// stale ticket are dropped silently.
    pub fn dispatch(&mut self, event: FlowEvent) -> Result<Vec<FlowEffect>, FlowError> {
        match event {
            FlowEvent::VideoGateChanged(completed) => Ok(self.on_gate(completed)),
            FlowEvent::LastLessonChanged(last) => {
                self.is_last_lesson = last;
                Ok(Vec::new())
            }
            FlowEvent::Reload => self.on_reload(),
            FlowEvent::QuizzesLoaded { ticket, quizzes } => Ok(self.on_quizzes(ticket, quizzes)),
            FlowEvent::HistoryLoaded { ticket, attempts } => Ok(self.on_history(ticket, attempts)),
            FlowEvent::LoadFailed { ticket, error } => self.on_load_failed(ticket, error),
            FlowEvent::StartRequested => self.on_start(),
            FlowEvent::AttemptStarted { ticket, started } => Ok(self.on_started(ticket, started)),
            FlowEvent::StartFailed { ticket, error } => self.on_start_failed(ticket, error),
            FlowEvent::AnswerSelected {
                question_id,
                option,
            } => self.on_answer(question_id, option).map(|()| Vec::new()),
            FlowEvent::SubmitRequested => self.on_submit(),
            FlowEvent::AttemptSubmitted { ticket, result } => Ok(self.on_submitted(ticket, result)),
            FlowEvent::SubmitFailed { ticket, error } => self.on_submit_failed(ticket, error),
            FlowEvent::RetryRequested => self.on_retry(),
            FlowEvent::ProceedRequested => self.on_proceed(),
        }
    }

    //
    // ─── GATE & LOADING ────────────────────────────────────────────────────────
    //

    fn on_gate(&mut self, completed: bool) -> Vec<FlowEffect> {
        self.video_completed = completed;
        let locked = matches!(self.state, FlowState::Locked);
        match (completed, locked) {
            (true, true) => self.enter_loading(),
            (false, false) => {
                self.lock();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn lock(&mut self) {
        tracing::debug!(lesson_id = %self.lesson_id, from = self.state.name(), "video gate closed");
        // The store grades a submit regardless of the gate, so keep its result.
        if let FlowState::Submitting { index, .. } = self.state {
            self.detached_submit = Some((self.ticket(), index));
        }
        self.generation += 1;
        self.state = FlowState::Locked;
        self.pending_quizzes = None;
        self.pending_history = None;
        self.current_questions.clear();
        self.answers.clear();
    }

    fn enter_loading(&mut self) -> Vec<FlowEffect> {
        self.generation += 1;
        self.state = FlowState::Loading;
        self.pending_quizzes = None;
        self.pending_history = None;
        self.current_questions.clear();
        self.answers.clear();
        tracing::debug!(lesson_id = %self.lesson_id, generation = self.generation, "loading quizzes");
        vec![FlowEffect::Load {
            ticket: self.ticket(),
            lesson_id: self.lesson_id,
        }]
    }

    fn on_reload(&mut self) -> Result<Vec<FlowEffect>, FlowError> {
        match self.state {
            FlowState::Locked => Err(FlowError::Locked),
            FlowState::Starting { .. } | FlowState::Submitting { .. } => {
                Err(self.reject("reload"))
            }
            _ => Ok(self.enter_loading()),
        }
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        let current = ticket == self.ticket();
        if !current {
            tracing::debug!(?ticket, current = ?self.ticket(), "dropping stale result");
        }
        current
    }

    fn on_quizzes(&mut self, ticket: Ticket, quizzes: Vec<Quiz>) -> Vec<FlowEffect> {
        if !self.is_current(ticket) || self.state != FlowState::Loading {
            return Vec::new();
        }
        self.pending_quizzes = Some(quizzes);
        self.try_resolve_load();
        Vec::new()
    }

    fn on_history(&mut self, ticket: Ticket, attempts: Vec<Attempt>) -> Vec<FlowEffect> {
        if !self.is_current(ticket) {
            return Vec::new();
        }
        match self.state {
            // try_resolve_load applies the latch once both results are in.
            FlowState::Loading => {
                self.pending_history = Some(attempts);
                self.try_resolve_load();
            }
            FlowState::ReadyToStart { .. } | FlowState::Finished(_) if self.has_started => {
                tracing::debug!(
                    lesson_id = %self.lesson_id,
                    index = self.current_index,
                    "ignoring attempt history received after the flow started"
                );
            }
            FlowState::ReadyToStart { .. } | FlowState::Finished(_) => {
                self.history = self.lesson_attempts(attempts);
                self.resolve_resume();
            }
            _ => {}
        }
        Vec::new()
    }

    fn on_load_failed(&mut self, ticket: Ticket, error: StorageError) -> Result<Vec<FlowEffect>, FlowError> {
        if !self.is_current(ticket) || self.state != FlowState::Loading {
            return Ok(Vec::new());
        }
        tracing::warn!(lesson_id = %self.lesson_id, %error, "failed to load quiz flow");
        self.last_error = Some(error.to_string());
        Err(FlowError::Storage(error))
    }

    fn lesson_attempts(&self, attempts: Vec<Attempt>) -> Vec<Attempt> {
        let ids: HashSet<QuizId> = self.quizzes.iter().map(Quiz::id).collect();
        attempts
            .into_iter()
            .filter(|attempt| ids.contains(&attempt.quiz_id()))
            .collect()
    }

    fn try_resolve_load(&mut self) {
        if self.pending_quizzes.is_none() || self.pending_history.is_none() {
            return;
        }
        self.quizzes = self.pending_quizzes.take().unwrap_or_default();
        let attempts = self.pending_history.take().unwrap_or_default();
        self.history = self.lesson_attempts(attempts);
        self.last_error = None;

        if self.quizzes.is_empty() {
            tracing::info!(lesson_id = %self.lesson_id, "lesson has no quizzes");
            self.state = FlowState::NoQuizRequired;
            return;
        }

        if self.has_started {
            // Mid-traversal reload: keep the learner where they were.
            self.state = match self.finished {
                Some(score) => FlowState::Finished(score),
                None => FlowState::ReadyToStart {
                    index: self.current_index.min(self.quizzes.len() - 1),
                },
            };
            return;
        }

        self.resolve_resume();
    }

    fn resolve_resume(&mut self) {
        match scoring::resume_index(&self.quizzes, &self.history) {
            Some(index) => {
                tracing::info!(lesson_id = %self.lesson_id, index, "resuming quiz flow");
                self.current_index = index;
                self.finished = None;
                self.state = FlowState::ReadyToStart { index };
            }
            None => {
                self.current_index = self.quizzes.len().saturating_sub(1);
                let score = scoring::aggregate(&[], &self.quizzes, &self.history);
                self.finish(score);
            }
        }
    }

    fn finish(&mut self, score: LessonScore) {
        tracing::info!(
            lesson_id = %self.lesson_id,
            score = score.score,
            path = ?score.path,
            "quiz flow finished"
        );
        self.finished = Some(score);
        self.state = FlowState::Finished(score);
    }

    //
    // ─── ATTEMPTS ──────────────────────────────────────────────────────────────
    //

    fn reject(&self, action: &'static str) -> FlowError {
        match self.state {
            FlowState::Locked => FlowError::Locked,
            _ => FlowError::InvalidAction {
                action,
                state: self.state.name(),
            },
        }
    }

    fn start_effect(&mut self, index: usize) -> Result<Vec<FlowEffect>, FlowError> {
        let quiz_id = self
            .quizzes
            .get(index)
            .map(Quiz::id)
            .ok_or_else(|| self.reject("start a quiz"))?;
        self.current_index = index;
        self.state = FlowState::Starting { index };
        Ok(vec![FlowEffect::StartAttempt {
            ticket: self.ticket(),
            quiz_id,
        }])
    }

    fn on_start(&mut self) -> Result<Vec<FlowEffect>, FlowError> {
        match self.state {
            FlowState::ReadyToStart { index } => {
                self.detached_submit = None;
                self.start_effect(index)
            }
            _ => Err(self.reject("start a quiz")),
        }
    }

    fn on_started(&mut self, ticket: Ticket, started: StartedAttempt) -> Vec<FlowEffect> {
        if !self.is_current(ticket) {
            return Vec::new();
        }
        let FlowState::Starting { index } = self.state else {
            return Vec::new();
        };
        if self.quizzes.get(index).map(Quiz::id) != Some(started.quiz_id) {
            tracing::warn!(
                expected = ?self.quizzes.get(index).map(Quiz::id),
                got = %started.quiz_id,
                "store started an attempt for a different quiz"
            );
        }
        if !self.has_started {
            tracing::debug!(lesson_id = %self.lesson_id, index, "learner started the flow");
            self.has_started = true;
        }
        self.state = FlowState::InQuiz {
            index,
            attempt_id: started.attempt_id,
        };
        self.current_index = index;
        self.current_questions = started.questions;
        self.answers.clear();
        self.last_error = None;
        Vec::new()
    }

    fn on_start_failed(&mut self, ticket: Ticket, error: StorageError) -> Result<Vec<FlowEffect>, FlowError> {
        if !self.is_current(ticket) {
            return Ok(Vec::new());
        }
        let FlowState::Starting { index } = self.state else {
            return Ok(Vec::new());
        };
        tracing::warn!(lesson_id = %self.lesson_id, index, %error, "failed to start attempt");
        self.state = FlowState::ReadyToStart { index };
        self.last_error = Some(error.to_string());
        Err(FlowError::Storage(error))
    }

    fn on_answer(&mut self, question_id: QuestionId, option: String) -> Result<(), FlowError> {
        if !matches!(self.state, FlowState::InQuiz { .. }) {
            return Err(self.reject("answer a question"));
        }
        let question = self
            .current_questions
            .iter()
            .find(|q| q.id() == question_id)
            .ok_or(FlowError::UnknownQuestion(question_id))?;
        if !question.has_option(&option) {
            return Err(FlowError::UnknownOption(question_id));
        }
        self.answers.select(question_id, option);
        Ok(())
    }

    fn on_submit(&mut self) -> Result<Vec<FlowEffect>, FlowError> {
        let FlowState::InQuiz { index, attempt_id } = self.state else {
            return Err(self.reject("submit answers"));
        };
        if self.current_questions.is_empty() {
            return Err(FlowError::EmptyQuiz);
        }
        let missing = self.answers.missing_for(&self.current_questions).len();
        if missing > 0 {
            return Err(FlowError::IncompleteAnswers { missing });
        }
        self.state = FlowState::Submitting { index, attempt_id };
        Ok(vec![FlowEffect::SubmitAttempt {
            ticket: self.ticket(),
            attempt_id,
            answers: self.answers.clone(),
        }])
    }

    fn on_submitted(&mut self, ticket: Ticket, result: AttemptScore) -> Vec<FlowEffect> {
        if let Some((_, index)) = self.detached_submit.filter(|(issued, _)| *issued == ticket) {
            self.detached_submit = None;
            self.record_detached_submit(index, result);
            return Vec::new();
        }
        if !self.is_current(ticket) {
            return Vec::new();
        }
        let FlowState::Submitting { index, .. } = self.state else {
            return Vec::new();
        };
        let Some(quiz_id) = self.quizzes.get(index).map(Quiz::id) else {
            return Vec::new();
        };

        tracing::info!(%quiz_id, index, score = result.score(), "quiz submitted");
        self.session_stats.push(SessionStat::from_score(quiz_id, &result));
        self.current_questions.clear();
        self.answers.clear();
        self.last_error = None;

        let next = index + 1;
        if next >= self.quizzes.len() {
            let score = scoring::aggregate(&self.session_stats, &self.quizzes, &self.history);
            self.finish(score);
            return Vec::new();
        }
        // Skip the ready screen and open the next quiz right away.
        self.start_effect(next).unwrap_or_default()
    }

    /// Count a submit that landed after the gate closed mid-request.
    ///
    /// Only the traversal position moves; the visible state is restored by
    /// the next load, or updated here if the learner is already waiting on
    /// that quiz.
    fn record_detached_submit(&mut self, index: usize, result: AttemptScore) {
        let Some(quiz_id) = self.quizzes.get(index).map(Quiz::id) else {
            return;
        };
        tracing::info!(%quiz_id, index, score = result.score(), "quiz submitted while locked");
        self.session_stats.push(SessionStat::from_score(quiz_id, &result));

        let waiting = self.state == FlowState::ReadyToStart { index };
        let next = index + 1;
        if next >= self.quizzes.len() {
            let score = scoring::aggregate(&self.session_stats, &self.quizzes, &self.history);
            if waiting {
                self.finish(score);
            } else {
                self.finished = Some(score);
            }
        } else {
            self.current_index = next;
            if waiting {
                self.state = FlowState::ReadyToStart { index: next };
            }
        }
    }

    fn on_submit_failed(&mut self, ticket: Ticket, error: StorageError) -> Result<Vec<FlowEffect>, FlowError> {
        if let Some((_, index)) = self.detached_submit.filter(|(issued, _)| *issued == ticket) {
            tracing::warn!(lesson_id = %self.lesson_id, index, %error, "submit failed after the gate closed");
            self.detached_submit = None;
            return Ok(Vec::new());
        }
        if !self.is_current(ticket) {
            return Ok(Vec::new());
        }
        let FlowState::Submitting { index, attempt_id } = self.state else {
            return Ok(Vec::new());
        };
        tracing::warn!(lesson_id = %self.lesson_id, index, %error, "failed to submit attempt");
        self.state = FlowState::InQuiz { index, attempt_id };
        self.last_error = Some(error.to_string());
        Err(FlowError::Storage(error))
    }

    //
    // ─── RESULT ────────────────────────────────────────────────────────────────
    //

    fn on_retry(&mut self) -> Result<Vec<FlowEffect>, FlowError> {
        if !matches!(self.state, FlowState::Finished(_)) {
            return Err(self.reject("retry"));
        }
        tracing::info!(lesson_id = %self.lesson_id, "retrying the lesson's quizzes from the start");
        self.generation += 1;
        self.session_stats.clear();
        self.detached_submit = None;
        self.finished = None;
        self.has_started = false;
        self.answers.clear();
        self.current_questions.clear();
        self.last_error = None;
        self.start_effect(0)
    }

    fn on_proceed(&mut self) -> Result<Vec<FlowEffect>, FlowError> {
        if matches!(self.state, FlowState::Locked) {
            return Err(FlowError::Locked);
        }
        if !self.can_proceed() {
            return Err(FlowError::ProceedUnavailable);
        }
        tracing::info!(lesson_id = %self.lesson_id, "advancing to next lesson");
        Ok(vec![FlowEffect::NavigateNext {
            lesson_id: self.lesson_id,
        }])
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
