// src/models/payload.rs

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{activity::ActivityLogEntry, answer::Answer};

/// Who triggered the final submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Manual,
    Auto,
}

impl SubmissionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionType::Manual => "manual",
            SubmissionType::Auto => "auto",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(SubmissionType::Manual),
            "auto" => Some(SubmissionType::Auto),
            _ => None,
        }
    }
}

/// Periodic best-effort snapshot of the attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutosavePayload {
    pub exam_id: i64,
    pub candidate: String,
    pub answers: BTreeMap<i64, Answer>,
    pub marked_for_review: BTreeSet<i64>,
    pub activity_logs: Vec<ActivityLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub exam_id: i64,
    pub candidate: String,
    pub submission_type: SubmissionType,
    pub answers: BTreeMap<i64, Answer>,
    pub marked_for_review: BTreeSet<i64>,
    pub activity_logs: Vec<ActivityLogEntry>,
}

/// Result returned by the submit sink. Identical for repeated submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub score: i64,
    pub total: i64,
    pub submission_type: SubmissionType,
    pub submitted_at: DateTime<Utc>,
}
