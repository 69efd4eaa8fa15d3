// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Question type: a single-choice question or a coding task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Choice,
    Coding,
}

impl QuestionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "choice" => Some(QuestionKind::Choice),
            "coding" => Some(QuestionKind::Coding),
            _ => None,
        }
    }
}

/// Extra data for coding questions. Judging itself happens elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodingSpec {
    pub languages: Vec<String>,
    pub starter_code: Option<String>,
    pub test_case_count: u32,
}

/// A question as shown to the candidate (no answer key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Mapped from the 'type' column since `type` is a reserved keyword in Rust.
    #[serde(rename = "type")]
    pub kind: QuestionKind,

    pub content: String,

    /// Option labels for choice questions; empty for coding questions.
    pub options: Vec<String>,

    pub coding: Option<CodingSpec>,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub exam_id: i64,
    pub position: i64,
    #[sqlx(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub options: Json<Vec<String>>,
    pub coding_spec: Option<Json<CodingSpec>>,

    /// Index of the correct option for choice questions.
    pub correct_option: Option<i64>,
    pub marks: i64,
}

impl QuestionRow {
    pub fn into_public(self) -> Option<Question> {
        let kind = QuestionKind::parse(&self.question_type)?;
        Some(Question {
            id: self.id,
            kind,
            content: self.content,
            options: self.options.0,
            coding: self.coding_spec.map(|spec| spec.0),
        })
    }
}
