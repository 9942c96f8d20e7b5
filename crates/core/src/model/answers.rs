use std::collections::BTreeMap;

use crate::model::ids::QuestionId;
use crate::model::quiz::Question;

/// Answers collected locally for the active quiz, keyed by question.
///
/// Nothing is sent to the store until every question of the quiz has a
/// selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSheet {
    selected: BTreeMap<QuestionId, String>,
}

impl AnswerSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the selected option for a question.
    pub fn select(&mut self, question_id: QuestionId, option: impl Into<String>) {
        self.selected.insert(question_id, option.into());
    }

    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&str> {
        self.selected.get(&question_id).map(String::as_str)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.selected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, &str)> {
        self.selected.iter().map(|(id, text)| (*id, text.as_str()))
    }

    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<QuestionId, String> {
        &self.selected
    }

    /// Questions of `questions` that have no selection yet, in quiz order.
    #[must_use]
    pub fn missing_for(&self, questions: &[Question]) -> Vec<QuestionId> {
        questions
            .iter()
            .map(Question::id)
            .filter(|id| !self.selected.contains_key(id))
            .collect()
    }

    /// True when every question has a selection.
    ///
    /// A quiz with no questions can never be complete.
    #[must_use]
    pub fn is_complete_for(&self, questions: &[Question]) -> bool {
        !questions.is_empty() && self.missing_for(questions).is_empty()
    }
}

impl FromIterator<(QuestionId, String)> for AnswerSheet {
    fn from_iter<I: IntoIterator<Item = (QuestionId, String)>>(iter: I) -> Self {
        Self {
            selected: iter.into_iter().collect(),
        }
    }
}
