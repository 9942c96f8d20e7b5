//! Store-side grading. Only the attempt store knows which option is correct.

use std::collections::BTreeMap;

use lesson_core::model::{AnswerSheet, AttemptScore, Question, QuestionId};

use crate::repository::StorageError;

/// Correct option text per question of a quiz.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerKey {
    correct: BTreeMap<QuestionId, String>,
}

impl AnswerKey {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, question_id: QuestionId, option: impl Into<String>) -> Self {
        self.insert(question_id, option);
        self
    }

    pub fn insert(&mut self, question_id: QuestionId, option: impl Into<String>) {
        self.correct.insert(question_id, option.into());
    }

    #[must_use]
    pub fn correct_for(&self, question_id: QuestionId) -> Option<&str> {
        self.correct.get(&question_id).map(String::as_str)
    }
}

impl FromIterator<(QuestionId, String)> for AnswerKey {
    fn from_iter<I: IntoIterator<Item = (QuestionId, String)>>(iter: I) -> Self {
        Self {
            correct: iter.into_iter().collect(),
        }
    }
}

/// Grade a submission against the quiz's questions.
///
/// Every question of the quiz counts toward the total. Unanswered questions and
/// answers for questions outside the quiz are never correct.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the counts cannot be represented.
pub fn grade(
    questions: &[Question],
    key: &AnswerKey,
    answers: &AnswerSheet,
) -> Result<AttemptScore, StorageError> {
    let correct = questions
        .iter()
        .filter(|question| {
            let chosen = answers.get(question.id());
            chosen.is_some() && chosen == key.correct_for(question.id())
        })
        .count();

    let total = u32::try_from(questions.len())
        .map_err(|_| StorageError::Serialization("too many questions".into()))?;
    let correct = u32::try_from(correct)
        .map_err(|_| StorageError::Serialization("too many correct answers".into()))?;

    AttemptScore::from_counts(correct, total)
        .map_err(|e| StorageError::Serialization(e.to_string()))
}
