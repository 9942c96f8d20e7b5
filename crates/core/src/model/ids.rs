use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map($name::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

numeric_id!(
    /// Identifier of a lesson inside a course
    LessonId
);
numeric_id!(
    /// Identifier of a quiz attached to a lesson
    QuizId
);
numeric_id!(
    /// Identifier of a single question within a quiz
    QuestionId
);
numeric_id!(
    /// Server-assigned identifier of one attempt at a quiz
    AttemptId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_id_display_is_bare_number() {
        assert_eq!(QuizId::new(42).to_string(), "42");
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", AttemptId::new(7)), "AttemptId(7)");
    }

    #[test]
    fn lesson_id_parses_with_surrounding_whitespace() {
        let id: LessonId = " 12 ".parse().unwrap();
        assert_eq!(id, LessonId::new(12));
    }

    #[test]
    fn invalid_question_id_reports_kind() {
        let err = "abc".parse::<QuestionId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse QuestionId from string");
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let id = QuizId::new(5);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "5");
    }
}
