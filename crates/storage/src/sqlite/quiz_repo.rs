use lesson_core::model::{LessonId, Question, Quiz, QuizId};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{
    conn, lesson_id_to_i64, question_id_from_i64, question_id_to_i64, quiz_id_from_i64,
    quiz_id_to_i64, ser,
};
use crate::grading::AnswerKey;
use crate::repository::{QuizRepository, StorageError};

/// Questions of a quiz in order, plus the answer key for grading.
pub(crate) async fn load_questions(
    conn_ref: &mut SqliteConnection,
    quiz_id: QuizId,
) -> Result<(Vec<Question>, AnswerKey), StorageError> {
    let rows = sqlx::query(
        r"
            SELECT id, text, correct_option
            FROM questions
            WHERE quiz_id = ?1
            ORDER BY position ASC, id ASC
        ",
    )
    .bind(quiz_id_to_i64(quiz_id)?)
    .fetch_all(&mut *conn_ref)
    .await
    .map_err(conn)?;

    let mut questions = Vec::with_capacity(rows.len());
    let mut key = AnswerKey::new();
    for row in rows {
        let raw_id: i64 = row.try_get("id").map_err(ser)?;
        let question_id = question_id_from_i64(raw_id)?;
        let text: String = row.try_get("text").map_err(ser)?;
        if let Some(correct) = row
            .try_get::<Option<String>, _>("correct_option")
            .map_err(ser)?
        {
            key.insert(question_id, correct);
        }

        let options = sqlx::query(
            r"
                SELECT text FROM question_options
                WHERE question_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(raw_id)
        .fetch_all(&mut *conn_ref)
        .await
        .map_err(conn)?
        .iter()
        .map(|option| option.try_get::<String, _>("text").map_err(ser))
        .collect::<Result<Vec<_>, _>>()?;

        questions.push(Question::new(question_id, text, options));
    }

    Ok((questions, key))
}

impl SqliteRepository {
    /// Insert or replace a quiz, its questions and their answer key.
    ///
    /// `position` orders quizzes within the lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any write fails; nothing is written in that case.
    pub async fn upsert_quiz(
        &self,
        lesson_id: LessonId,
        position: u32,
        quiz: &Quiz,
        key: &AnswerKey,
    ) -> Result<(), StorageError> {
        let quiz_id = quiz_id_to_i64(quiz.id())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO quizzes (id, lesson_id, position, title)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    lesson_id = excluded.lesson_id,
                    position = excluded.position,
                    title = excluded.title
            ",
        )
        .bind(quiz_id)
        .bind(lesson_id_to_i64(lesson_id)?)
        .bind(i64::from(position))
        .bind(quiz.title())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM questions WHERE quiz_id = ?1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (q_pos, question) in quiz.questions().iter().enumerate() {
            let question_id = question_id_to_i64(question.id())?;
            sqlx::query(
                r"
                    INSERT INTO questions (id, quiz_id, position, text, correct_option)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(question_id)
            .bind(quiz_id)
            .bind(i64::try_from(q_pos).map_err(ser)?)
            .bind(question.text())
            .bind(key.correct_for(question.id()))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (o_pos, option) in question.options().iter().enumerate() {
                sqlx::query(
                    r"
                        INSERT INTO question_options (question_id, position, text)
                        VALUES (?1, ?2, ?3)
                    ",
                )
                .bind(question_id)
                .bind(i64::try_from(o_pos).map_err(ser)?)
                .bind(option.as_str())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(%lesson_id, quiz_id = %quiz.id(), "upserted quiz");
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn list_quizzes(&self, lesson_id: LessonId) -> Result<Vec<Quiz>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        let rows = sqlx::query(
            r"
                SELECT id, title
                FROM quizzes
                WHERE lesson_id = ?1
                ORDER BY position ASC, id ASC
            ",
        )
        .bind(lesson_id_to_i64(lesson_id)?)
        .fetch_all(&mut *db)
        .await
        .map_err(conn)?;

        let mut quizzes = Vec::with_capacity(rows.len());
        for row in rows {
            let quiz_id = quiz_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            let title: String = row.try_get("title").map_err(ser)?;
            let (questions, _key) = load_questions(&mut db, quiz_id).await?;
            quizzes.push(Quiz::new(quiz_id, title, questions));
        }
        Ok(quizzes)
    }
}
