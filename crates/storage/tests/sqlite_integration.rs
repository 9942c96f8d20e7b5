use lesson_core::model::{AnswerSheet, LessonId, Question, QuestionId, Quiz, QuizId};
use lesson_core::time::{fixed_clock, fixed_now};
use storage::grading::AnswerKey;
use storage::repository::{AttemptRepository, QuizRepository, StorageError};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url)
        .await
        .expect("connect")
        .with_clock(fixed_clock());
    repo.migrate().await.expect("migrate");
    repo
}

fn quiz(id: u64, questions: u64) -> (Quiz, AnswerKey) {
    let mut key = AnswerKey::new();
    let questions = (1..=questions)
        .map(|n| {
            let question_id = QuestionId::new(id * 100 + n);
            key.insert(question_id, "right");
            Question::new(
                question_id,
                format!("Question {n}"),
                vec!["wrong".into(), "right".into(), "also wrong".into()],
            )
        })
        .collect();
    (Quiz::new(QuizId::new(id), format!("Quiz {id}"), questions), key)
}

#[tokio::test]
async fn sqlite_lists_quizzes_by_position_with_option_order() {
    let repo = connect("memdb_list_quizzes").await;
    let lesson = LessonId::new(3);

    let (second, second_key) = quiz(20, 1);
    let (first, first_key) = quiz(10, 2);
    repo.upsert_quiz(lesson, 1, &second, &second_key).await.unwrap();
    repo.upsert_quiz(lesson, 0, &first, &first_key).await.unwrap();

    let listed = repo.list_quizzes(lesson).await.unwrap();
    assert_eq!(listed, vec![first, second]);
    assert_eq!(
        listed[0].questions()[0].options(),
        &["wrong".to_string(), "right".into(), "also wrong".into()]
    );
}

#[tokio::test]
async fn sqlite_upsert_replaces_questions() {
    let repo = connect("memdb_upsert_replaces").await;
    let lesson = LessonId::new(1);
    let (original, key) = quiz(1, 3);
    repo.upsert_quiz(lesson, 0, &original, &key).await.unwrap();

    let (smaller, key) = quiz(1, 1);
    repo.upsert_quiz(lesson, 0, &smaller, &key).await.unwrap();

    let listed = repo.list_quizzes(lesson).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].question_count(), 1);
}

#[tokio::test]
async fn sqlite_grades_and_records_attempts() {
    let repo = connect("memdb_grades_attempts").await;
    let (q, key) = quiz(1, 4);
    repo.upsert_quiz(LessonId::new(1), 0, &q, &key).await.unwrap();

    let started = repo.start_attempt(q.id()).await.unwrap();
    assert_eq!(started.questions.len(), 4);

    let mut answers = AnswerSheet::new();
    answers.select(QuestionId::new(101), "right");
    answers.select(QuestionId::new(102), "wrong");
    answers.select(QuestionId::new(103), "right");
    answers.select(QuestionId::new(104), "right");
    let result = repo.submit_attempt(started.attempt_id, &answers).await.unwrap();
    assert_eq!(result.correct_answers(), 3);
    assert_eq!(result.total_questions(), 4);
    assert!((result.score() - 75.0).abs() < f64::EPSILON);

    let history = repo.list_user_attempts().await.unwrap();
    assert_eq!(history.len(), 1);
    let attempt = &history[0];
    assert!(attempt.is_completed());
    assert_eq!(attempt.completed_at(), Some(fixed_now()));
    assert_eq!(attempt.answers().get(&QuestionId::new(102)).map(String::as_str), Some("wrong"));

    let resubmit = repo.submit_attempt(started.attempt_id, &answers).await;
    assert!(matches!(resubmit, Err(StorageError::Conflict)));
}

#[tokio::test]
async fn sqlite_rejects_unknown_quiz_and_attempt() {
    let repo = connect("memdb_unknown_ids").await;
    assert!(matches!(
        repo.start_attempt(QuizId::new(404)).await,
        Err(StorageError::NotFound)
    ));
    assert!(matches!(
        repo.submit_attempt(lesson_core::model::AttemptId::new(404), &AnswerSheet::new())
            .await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_leaves_orphaned_attempts_in_progress() {
    let repo = connect("memdb_orphans").await;
    let (q, key) = quiz(1, 1);
    repo.upsert_quiz(LessonId::new(1), 0, &q, &key).await.unwrap();

    let first = repo.start_attempt(q.id()).await.unwrap();
    let second = repo.start_attempt(q.id()).await.unwrap();
    assert_ne!(first.attempt_id, second.attempt_id);

    let history = repo.list_user_attempts().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|a| !a.is_completed()));
}
