mod answers;
mod attempt;
mod ids;
mod quiz;

pub use answers::AnswerSheet;
pub use attempt::{Attempt, AttemptScore, ScoreError, StartedAttempt};
pub use ids::{AttemptId, LessonId, ParseIdError, QuestionId, QuizId};
pub use quiz::{Question, Quiz};
