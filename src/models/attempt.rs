// src/models/attempt.rs

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::models::{activity::ActivityLogEntry, answer::Answer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value == "submitted" {
            AttemptStatus::Submitted
        } else {
            AttemptStatus::InProgress
        }
    }
}

/// One candidate's attempt at one exam, as known to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub exam_id: i64,
    pub candidate: String,

    /// Server-issued start; the countdown is always derived from this.
    pub started_at: DateTime<Utc>,
    pub status: AttemptStatus,

    /// Key: Question ID
    pub answers: BTreeMap<i64, Answer>,
    pub marked_for_review: BTreeSet<i64>,
}

/// Represents the 'attempts' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub exam_id: i64,
    pub candidate: String,
    pub started_at: DateTime<Utc>,
    pub status: String,
    pub answers: Json<BTreeMap<i64, Answer>>,
    pub marked: Json<BTreeSet<i64>>,
    pub activity_logs: Json<Vec<ActivityLogEntry>>,
    pub submission_type: Option<String>,
    pub score: Option<i64>,
    pub total: Option<i64>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl From<AttemptRow> for ExamAttempt {
    fn from(row: AttemptRow) -> Self {
        Self {
            exam_id: row.exam_id,
            candidate: row.candidate,
            started_at: row.started_at,
            status: AttemptStatus::parse(&row.status),
            answers: row.answers.0,
            marked_for_review: row.marked.0,
        }
    }
}

/// Seconds left in an attempt: `duration*60 - floor(elapsed_ms / 1000)`, never negative.
pub fn remaining_seconds(duration_minutes: i64, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let elapsed = (now - started_at).num_milliseconds().max(0).div_euclid(1000);
    let remaining = duration_minutes.saturating_mul(60).saturating_sub(elapsed);
    u64::try_from(remaining).unwrap_or(0)
}
