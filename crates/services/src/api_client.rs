use std::collections::BTreeMap;
use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use lesson_core::model::{
    AnswerSheet, Attempt, AttemptId, AttemptScore, LessonId, Question, QuestionId, Quiz, QuizId,
    StartedAttempt,
};
use storage::repository::{AttemptRepository, QuizRepository, StorageError};

use crate::error::ApiConfigError;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl ApiConfig {
    /// Read `LEARN_API_BASE_URL` and the optional `LEARN_API_TOKEN`.
    ///
    /// Returns `None` when no base url is configured.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("LEARN_API_BASE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let token = env::var("LEARN_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Some(Self { base_url, token })
    }
}

/// Attempt store backed by the course REST API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns `ApiConfigError::InvalidBaseUrl` unless the base url is http(s).
    pub fn new(config: ApiConfig) -> Result<Self, ApiConfigError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let has_host = base_url
            .strip_prefix("https://")
            .or_else(|| base_url.strip_prefix("http://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(ApiConfigError::InvalidBaseUrl(config.base_url));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            token: config.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StorageError> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StorageError> {
    let status = response.status();
    if !status.is_success() {
        tracing::warn!(%status, url = %response.url(), "attempt api request failed");
        return Err(status_error(status));
    }
    response.json().await.map_err(transport_error)
}

fn status_error(status: StatusCode) -> StorageError {
    match status {
        StatusCode::NOT_FOUND => StorageError::NotFound,
        StatusCode::CONFLICT => StorageError::Conflict,
        other => StorageError::Connection(format!("unexpected status {other}")),
    }
}

fn transport_error(err: reqwest::Error) -> StorageError {
    if err.is_decode() {
        StorageError::Serialization(err.to_string())
    } else {
        StorageError::Connection(err.to_string())
    }
}

#[async_trait]
impl QuizRepository for ApiClient {
    async fn list_quizzes(&self, lesson_id: LessonId) -> Result<Vec<Quiz>, StorageError> {
        let url = self.url(&format!("/lessons/{lesson_id}/quizzes"));
        let quizzes: Vec<QuizDto> = self.send(self.client.get(url)).await?;
        Ok(quizzes.into_iter().map(QuizDto::into_quiz).collect())
    }
}

#[async_trait]
impl AttemptRepository for ApiClient {
    async fn list_user_attempts(&self) -> Result<Vec<Attempt>, StorageError> {
        let attempts: Vec<AttemptDto> = self.send(self.client.get(self.url("/attempts"))).await?;
        attempts.into_iter().map(AttemptDto::into_attempt).collect()
    }

    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, StorageError> {
        let url = self.url(&format!("/quizzes/{quiz_id}/attempts"));
        let started: StartedDto = self.send(self.client.post(url)).await?;
        Ok(started.into_started())
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerSheet,
    ) -> Result<AttemptScore, StorageError> {
        let url = self.url(&format!("/attempts/{attempt_id}/submit"));
        let payload = SubmitRequest {
            answers: answers.as_map(),
        };
        let result: SubmitResponse = self.send(self.client.post(url).json(&payload)).await?;
        result.into_score()
    }
}

//
// ─── WIRE FORMAT ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct QuestionDto {
    id: QuestionId,
    text: String,
    #[serde(default)]
    options: Vec<String>,
}

impl QuestionDto {
    fn into_question(self) -> Question {
        Question::new(self.id, self.text, self.options)
    }
}

#[derive(Debug, Deserialize)]
struct QuizDto {
    id: QuizId,
    title: String,
    #[serde(default)]
    questions: Vec<QuestionDto>,
}

impl QuizDto {
    fn into_quiz(self) -> Quiz {
        let questions = self
            .questions
            .into_iter()
            .map(QuestionDto::into_question)
            .collect();
        Quiz::new(self.id, self.title, questions)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptDto {
    id: AttemptId,
    quiz_id: QuizId,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    score: Option<f64>,
    #[serde(default)]
    correct_answers: u32,
    #[serde(default)]
    total_questions: u32,
    #[serde(default)]
    answers: BTreeMap<QuestionId, String>,
}

impl AttemptDto {
    /// Scored rows must carry a valid result; unscored rows pass through.
    fn into_attempt(self) -> Result<Attempt, StorageError> {
        if let Some(score) = self.score {
            AttemptScore::new(score, self.correct_answers, self.total_questions)
                .map_err(|err| StorageError::Serialization(err.to_string()))?;
        }
        Ok(Attempt::from_persisted(
            self.id,
            self.quiz_id,
            self.started_at,
            self.completed_at,
            self.score,
            self.correct_answers,
            self.total_questions,
            self.answers,
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedDto {
    attempt_id: AttemptId,
    quiz_id: QuizId,
    #[serde(default)]
    questions: Vec<QuestionDto>,
}

impl StartedDto {
    fn into_started(self) -> StartedAttempt {
        StartedAttempt {
            attempt_id: self.attempt_id,
            quiz_id: self.quiz_id,
            questions: self
                .questions
                .into_iter()
                .map(QuestionDto::into_question)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    answers: &'a BTreeMap<QuestionId, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    score: f64,
    correct_answers: u32,
    total_questions: u32,
}

impl SubmitResponse {
    fn into_score(self) -> Result<AttemptScore, StorageError> {
        AttemptScore::new(self.score, self.correct_answers, self.total_questions)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
