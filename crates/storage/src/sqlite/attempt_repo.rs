use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lesson_core::model::{
    AnswerSheet, Attempt, AttemptId, AttemptScore, QuestionId, QuizId, StartedAttempt,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_i64, attempt_id_to_i64, conn, question_id_from_i64, question_id_to_i64,
    quiz_id_from_i64, quiz_id_to_i64, ser, u32_from_i64,
};
use super::quiz_repo::load_questions;
use crate::grading::grade;
use crate::repository::{AttemptRepository, StorageError};

fn map_attempt_row(
    row: &sqlx::sqlite::SqliteRow,
    answers: BTreeMap<QuestionId, String>,
) -> Result<Attempt, StorageError> {
    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;
    Ok(Attempt::from_persisted(
        attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        started_at,
        completed_at,
        row.try_get::<Option<f64>, _>("score").map_err(ser)?,
        u32_from_i64(
            "correct_answers",
            row.try_get::<i64, _>("correct_answers").map_err(ser)?,
        )?,
        u32_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        answers,
    ))
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn list_user_attempts(&self) -> Result<Vec<Attempt>, StorageError> {
        let answer_rows = sqlx::query(
            r"
                SELECT attempt_id, question_id, selected_option
                FROM attempt_answers
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut answers: BTreeMap<AttemptId, BTreeMap<QuestionId, String>> = BTreeMap::new();
        for row in answer_rows {
            let attempt_id =
                attempt_id_from_i64(row.try_get::<i64, _>("attempt_id").map_err(ser)?)?;
            let question_id =
                question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
            let selected: String = row.try_get("selected_option").map_err(ser)?;
            answers
                .entry(attempt_id)
                .or_default()
                .insert(question_id, selected);
        }

        let rows = sqlx::query(
            r"
                SELECT
                    id, quiz_id, started_at, completed_at,
                    score, correct_answers, total_questions
                FROM attempts
                ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            out.push(map_attempt_row(&row, answers.remove(&id).unwrap_or_default())?);
        }
        Ok(out)
    }

    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let (questions, _key) = load_questions(&mut tx, quiz_id).await?;

        let exists = sqlx::query("SELECT 1 FROM quizzes WHERE id = ?1")
            .bind(quiz_id_to_i64(quiz_id)?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let res = sqlx::query("INSERT INTO attempts (quiz_id, started_at) VALUES (?1, ?2)")
            .bind(quiz_id_to_i64(quiz_id)?)
            .bind(self.clock.now())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        tx.commit().await.map_err(conn)?;

        let attempt_id = attempt_id_from_i64(res.last_insert_rowid())?;
        tracing::debug!(%quiz_id, %attempt_id, "started attempt");
        Ok(StartedAttempt {
            attempt_id,
            quiz_id,
            questions,
        })
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerSheet,
    ) -> Result<AttemptScore, StorageError> {
        let raw_attempt_id = attempt_id_to_i64(attempt_id)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let row = sqlx::query(
            r"
                SELECT quiz_id, completed_at, score
                FROM attempts
                WHERE id = ?1
            ",
        )
        .bind(raw_attempt_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;
        let score: Option<f64> = row.try_get("score").map_err(ser)?;
        if completed_at.is_some() || score.is_some() {
            return Err(StorageError::Conflict);
        }
        let quiz_id = quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?;

        let (questions, key) = load_questions(&mut tx, quiz_id).await?;
        let result = grade(&questions, &key, answers)?;

        sqlx::query(
            r"
                UPDATE attempts
                SET completed_at = ?1, score = ?2, correct_answers = ?3, total_questions = ?4
                WHERE id = ?5
            ",
        )
        .bind(self.clock.now())
        .bind(result.score())
        .bind(i64::from(result.correct_answers()))
        .bind(i64::from(result.total_questions()))
        .bind(raw_attempt_id)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for (question_id, selected) in answers.iter() {
            sqlx::query(
                r"
                    INSERT INTO attempt_answers (attempt_id, question_id, selected_option)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(attempt_id, question_id) DO UPDATE SET
                        selected_option = excluded.selected_option
                ",
            )
            .bind(raw_attempt_id)
            .bind(question_id_to_i64(question_id)?)
            .bind(selected)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(%attempt_id, score = result.score(), "graded attempt");
        Ok(result)
    }
}
