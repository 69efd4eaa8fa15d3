// src/models/answer.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::QuestionKind;

/// A candidate's answer to one question. Overwritten, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// Selected option index for a choice question.
    Choice { option: usize },
    Coding(CodingAnswer),
}

impl Answer {
    /// Whether this answer has the shape expected for a question of `kind`.
    pub fn matches(&self, kind: QuestionKind) -> bool {
        matches!(
            (self, kind),
            (Answer::Choice { .. }, QuestionKind::Choice) | (Answer::Coding(_), QuestionKind::Coding)
        )
    }
}

/// Source and last known judge outcome of a coding question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodingAnswer {
    pub code: String,
    pub language: String,

    /// `None` until the code has been run at least once.
    pub passed: Option<bool>,

    #[serde(default)]
    pub test_results: Vec<TestCaseResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TestCaseResult {
    #[validate(length(max = 10000))]
    pub input: String,
    #[validate(length(max = 10000))]
    pub expected: String,
    #[validate(length(max = 10000))]
    pub actual: String,
    pub passed: bool,
}
