// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::config::DEFAULT_FOCUS_LOSS_LIMIT;

/// An exam definition as served by the exam provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,

    /// Allowed attempt length in minutes, measured from the server-issued start.
    pub duration_minutes: i64,

    pub proctoring: ProctoringConfig,
}

/// Which proctoring modes an exam requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProctoringConfig {
    pub camera_required: bool,
    pub screen_required: bool,
    pub fullscreen_required: bool,
    pub focus_loss_limit: u32,

    /// Passed to the face detector, 0.0 (lenient) to 1.0 (strict).
    pub face_sensitivity: f32,
}

impl Default for ProctoringConfig {
    fn default() -> Self {
        Self {
            camera_required: true,
            screen_required: false,
            fullscreen_required: true,
            focus_loss_limit: DEFAULT_FOCUS_LOSS_LIMIT,
            face_sensitivity: 0.5,
        }
    }
}

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct ExamRow {
    pub id: i64,
    pub title: String,
    pub duration_minutes: i64,
    pub camera_required: bool,
    pub screen_required: bool,
    pub fullscreen_required: bool,
    pub focus_loss_limit: i64,
    pub face_sensitivity: f64,
}

impl From<ExamRow> for Exam {
    fn from(row: ExamRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            duration_minutes: row.duration_minutes,
            proctoring: ProctoringConfig {
                camera_required: row.camera_required,
                screen_required: row.screen_required,
                fullscreen_required: row.fullscreen_required,
                focus_loss_limit: u32::try_from(row.focus_loss_limit)
                    .unwrap_or(DEFAULT_FOCUS_LOSS_LIMIT)
                    .max(1),
                face_sensitivity: row.face_sensitivity as f32,
            },
        }
    }
}
