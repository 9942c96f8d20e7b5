use std::sync::Arc;

use lesson_core::model::{Attempt, AttemptId, AttemptScore, LessonId, Question, QuestionId, Quiz, QuizId};
use lesson_core::scoring::{AggregationPath, Verdict};
use lesson_core::time::{fixed_clock, fixed_minutes};
use services::{FlowError, FlowState, QuizFlowController, RecordingNavigation};
use storage::grading::AnswerKey;
use storage::repository::{AttemptRepository, InMemoryRepository, Storage};

const LESSON: LessonId = LessonId::new(1);

/// Seed quizzes whose questions all have "right" as the correct option.
fn seed(repo: &InMemoryRepository, lesson_id: LessonId, quizzes: &[(u64, u64)]) {
    let mut next_question = 1;
    for &(quiz_id, question_count) in quizzes {
        let mut key = AnswerKey::new();
        let questions = (0..question_count)
            .map(|_| {
                let id = QuestionId::new(next_question);
                next_question += 1;
                key.insert(id, "right");
                Question::new(id, format!("Question {id}"), vec!["right".into(), "wrong".into()])
            })
            .collect();
        repo.insert_quiz(
            lesson_id,
            Quiz::new(QuizId::new(quiz_id), format!("Quiz {quiz_id}"), questions),
            key,
        )
        .unwrap();
    }
}

fn controller(
    repo: &InMemoryRepository,
    lesson_id: LessonId,
) -> (QuizFlowController, Arc<RecordingNavigation>) {
    let navigation = Arc::new(RecordingNavigation::new());
    let storage = Storage::from_repository(repo.clone());
    let controller = QuizFlowController::from_storage(lesson_id, &storage, navigation.clone());
    (controller, navigation)
}

/// Answer the open quiz with `correct` right answers and the rest wrong.
async fn answer(controller: &mut QuizFlowController, correct: usize) {
    let ids: Vec<QuestionId> = controller
        .machine()
        .current_questions()
        .iter()
        .map(Question::id)
        .collect();
    for (position, id) in ids.into_iter().enumerate() {
        let option = if position < correct { "right" } else { "wrong" };
        controller.select_answer(id, option).await.unwrap();
    }
}

fn completed(id: u64, quiz_id: u64, correct: u32, total: u32, minute: i64) -> Attempt {
    Attempt::completed(
        AttemptId::new(id),
        QuizId::new(quiz_id),
        fixed_minutes(minute),
        fixed_minutes(minute + 2),
        AttemptScore::from_counts(correct, total).unwrap(),
    )
}

#[tokio::test]
async fn quizzes_stay_locked_until_video_is_watched() {
    let repo = InMemoryRepository::new();
    seed(&repo, LESSON, &[(1, 2)]);
    let (mut flow, _) = controller(&repo, LESSON);

    let err = flow.start().await.unwrap_err();
    assert!(matches!(err, FlowError::Locked));
    assert_eq!(flow.snapshot().state, FlowState::Locked);
    assert!(repo.list_user_attempts().await.unwrap().is_empty());

    flow.set_video_completed(true).await.unwrap();
    assert_eq!(flow.snapshot().state, FlowState::ReadyToStart { index: 0 });
}

#[tokio::test]
async fn full_traversal_scores_on_pooled_counts() {
    let repo = InMemoryRepository::new().with_clock(fixed_clock());
    seed(&repo, LESSON, &[(1, 2), (2, 8)]);
    let (mut flow, navigation) = controller(&repo, LESSON);

    flow.set_video_completed(true).await.unwrap();
    flow.start().await.unwrap();
    assert!(matches!(flow.snapshot().state, FlowState::InQuiz { index: 0, .. }));

    answer(&mut flow, 2).await;
    flow.submit().await.unwrap();

    // The second quiz opens without a separate start.
    let snapshot = flow.snapshot();
    assert!(matches!(snapshot.state, FlowState::InQuiz { index: 1, .. }));
    assert_eq!(snapshot.current_questions.len(), 8);
    assert_eq!(snapshot.progress.completed, 1);

    answer(&mut flow, 1).await;
    flow.submit().await.unwrap();

    let result = flow.snapshot().final_result.expect("finished");
    assert_eq!(result.path, AggregationPath::Session);
    assert!((result.score - 30.0).abs() < 1e-9);
    assert!(!result.passed);
    assert_eq!(result.verdict, Verdict::QuizCompleted);
    assert!(result.can_retry);
    assert!(!result.can_proceed);

    assert!(matches!(flow.proceed().await, Err(FlowError::ProceedUnavailable)));
    assert!(navigation.requests().is_empty());
    assert_eq!(repo.list_user_attempts().await.unwrap().len(), 2);
}

#[tokio::test]
async fn incomplete_answers_never_reach_the_store() {
    let repo = InMemoryRepository::new();
    seed(&repo, LESSON, &[(1, 3)]);
    let (mut flow, _) = controller(&repo, LESSON);
    flow.set_video_completed(true).await.unwrap();
    flow.start().await.unwrap();

    let first = flow.machine().current_questions()[0].id();
    flow.select_answer(first, "right").await.unwrap();
    let err = flow.submit().await.unwrap_err();

    assert!(matches!(err, FlowError::IncompleteAnswers { missing: 2 }));
    assert!(matches!(flow.snapshot().state, FlowState::InQuiz { .. }));
    let attempts = repo.list_user_attempts().await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].is_completed());
}

#[tokio::test]
async fn resumes_at_first_unfinished_quiz() {
    let repo = InMemoryRepository::new().with_clock(fixed_clock());
    seed(&repo, LESSON, &[(1, 1), (2, 1), (3, 1)]);

    let (mut first_visit, _) = controller(&repo, LESSON);
    first_visit.set_video_completed(true).await.unwrap();
    first_visit.start().await.unwrap();
    answer(&mut first_visit, 1).await;
    first_visit.submit().await.unwrap();
    drop(first_visit);

    let (mut second_visit, _) = controller(&repo, LESSON);
    second_visit.set_video_completed(true).await.unwrap();
    let snapshot = second_visit.snapshot();
    assert_eq!(snapshot.state, FlowState::ReadyToStart { index: 1 });
    assert_eq!(snapshot.current_quiz_index, 1);
    assert_eq!(snapshot.quiz_count, 3);
}

#[tokio::test]
async fn completed_history_finishes_without_starting_attempts() {
    let repo = InMemoryRepository::new();
    seed(&repo, LESSON, &[(1, 4), (2, 5)]);
    repo.insert_attempt(completed(1, 1, 4, 4, 0)).unwrap();
    repo.insert_attempt(completed(2, 2, 4, 5, 10)).unwrap();
    let (mut flow, navigation) = controller(&repo, LESSON);

    flow.set_video_completed(true).await.unwrap();

    let result = flow.snapshot().final_result.expect("finished");
    assert_eq!(result.path, AggregationPath::Historical);
    assert!((result.score - 90.0).abs() < 1e-9);
    assert!(result.can_proceed);
    assert_eq!(repo.list_user_attempts().await.unwrap().len(), 2);

    flow.proceed().await.unwrap();
    assert_eq!(navigation.requests(), vec![LESSON]);
}

#[tokio::test]
async fn historical_score_uses_latest_attempt_per_quiz() {
    let repo = InMemoryRepository::new();
    seed(&repo, LESSON, &[(1, 5)]);
    repo.insert_attempt(completed(1, 1, 5, 5, 0)).unwrap();
    repo.insert_attempt(completed(2, 1, 1, 5, 30)).unwrap();
    let (mut flow, _) = controller(&repo, LESSON);

    flow.set_video_completed(true).await.unwrap();

    let result = flow.snapshot().final_result.expect("finished");
    assert!((result.score - 20.0).abs() < 1e-9);
    assert!(!result.passed);
}

#[tokio::test]
async fn last_lesson_never_offers_proceed() {
    let repo = InMemoryRepository::new();
    seed(&repo, LESSON, &[(1, 1)]);
    repo.insert_attempt(completed(1, 1, 1, 1, 0)).unwrap();
    let (mut flow, navigation) = controller(&repo, LESSON);
    flow.set_last_lesson(true);
    flow.set_video_completed(true).await.unwrap();

    let result = flow.snapshot().final_result.expect("finished");
    assert!(result.passed);
    assert!(!result.can_proceed);
    assert!(flow.proceed().await.is_err());
    assert!(navigation.requests().is_empty());
}

#[tokio::test]
async fn lesson_without_quizzes_can_be_skipped() {
    let repo = InMemoryRepository::new();
    let (mut flow, navigation) = controller(&repo, LessonId::new(5));
    flow.set_video_completed(true).await.unwrap();

    let snapshot = flow.snapshot();
    assert_eq!(snapshot.state, FlowState::NoQuizRequired);
    assert!(snapshot.can_proceed);
    assert!(snapshot.final_result.is_none());

    flow.proceed().await.unwrap();
    assert_eq!(navigation.requests(), vec![LessonId::new(5)]);
    assert!(repo.list_user_attempts().await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_restarts_the_whole_sequence() {
    let repo = InMemoryRepository::new().with_clock(fixed_clock());
    seed(&repo, LESSON, &[(1, 2), (2, 2)]);
    let (mut flow, navigation) = controller(&repo, LESSON);
    flow.set_video_completed(true).await.unwrap();
    flow.start().await.unwrap();
    answer(&mut flow, 2).await;
    flow.submit().await.unwrap();
    answer(&mut flow, 0).await;
    flow.submit().await.unwrap();
    let first = flow.snapshot().final_result.expect("finished");
    assert!((first.score - 50.0).abs() < 1e-9);

    flow.retry().await.unwrap();
    let snapshot = flow.snapshot();
    assert!(matches!(snapshot.state, FlowState::InQuiz { index: 0, .. }));
    assert!(flow.machine().session_stats().is_empty());

    answer(&mut flow, 2).await;
    flow.submit().await.unwrap();
    answer(&mut flow, 2).await;
    flow.submit().await.unwrap();

    let second = flow.snapshot().final_result.expect("finished");
    assert_eq!(second.path, AggregationPath::Session);
    assert!((second.score - 100.0).abs() < 1e-9);
    assert!(second.can_proceed);
    assert_eq!(repo.list_user_attempts().await.unwrap().len(), 4);

    flow.proceed().await.unwrap();
    assert_eq!(navigation.requests(), vec![LESSON]);
}

#[tokio::test]
async fn changing_lesson_starts_over_locked() {
    let repo = InMemoryRepository::new();
    seed(&repo, LESSON, &[(1, 1)]);
    seed(&repo, LessonId::new(2), &[(2, 1)]);
    let (mut flow, _) = controller(&repo, LESSON);
    flow.set_video_completed(true).await.unwrap();
    flow.start().await.unwrap();

    flow.set_lesson(LessonId::new(2));
    assert_eq!(flow.snapshot().state, FlowState::Locked);
    assert!(flow.snapshot().answers.is_empty());

    flow.set_video_completed(true).await.unwrap();
    assert_eq!(flow.snapshot().state, FlowState::ReadyToStart { index: 0 });
    assert_eq!(flow.machine().quizzes()[0].id(), QuizId::new(2));
}

#[tokio::test]
async fn reload_after_start_returns_to_the_current_quiz() {
    let repo = InMemoryRepository::new().with_clock(fixed_clock());
    seed(&repo, LESSON, &[(1, 1), (2, 1), (3, 1)]);
    let (mut flow, _) = controller(&repo, LESSON);
    flow.set_video_completed(true).await.unwrap();
    flow.start().await.unwrap();
    answer(&mut flow, 1).await;
    flow.submit().await.unwrap();
    assert!(matches!(flow.snapshot().state, FlowState::InQuiz { index: 1, .. }));

    flow.initialize().await.unwrap();
    assert_eq!(flow.snapshot().state, FlowState::ReadyToStart { index: 1 });

    flow.set_video_completed(false).await.unwrap();
    assert_eq!(flow.snapshot().state, FlowState::Locked);
    flow.set_video_completed(true).await.unwrap();
    assert_eq!(flow.snapshot().state, FlowState::ReadyToStart { index: 1 });
    assert_eq!(flow.machine().session_stats().len(), 1);

    flow.start().await.unwrap();
    answer(&mut flow, 1).await;
    flow.submit().await.unwrap();
    answer(&mut flow, 0).await;
    flow.submit().await.unwrap();

    let result = flow.snapshot().final_result.expect("finished");
    assert_eq!(result.path, AggregationPath::Session);
    assert!((result.score - 200.0 / 3.0).abs() < 1e-9);
}
