// src/session/snapshot.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::{
    models::{answer::Answer, payload::SubmissionType, payload::SubmitReceipt, question::Question},
    session::{
        media::TrackStatus,
        recording::RecordingFlags,
        violation::{ViolationCategory, ViolationStatus},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Loading,
    Active,
    Finalizing,
    Terminated,
}

/// Why the session is being finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "category", rename_all = "snake_case")]
pub enum FinalizeReason {
    Manual,
    TimeUp,
    Violation(ViolationCategory),
    ScreenShareStopped,
}

impl FinalizeReason {
    pub fn submission_type(self) -> SubmissionType {
        match self {
            FinalizeReason::Manual => SubmissionType::Manual,
            _ => SubmissionType::Auto,
        }
    }

    pub fn is_automatic(self) -> bool {
        self.submission_type() == SubmissionType::Auto
    }
}

/// Transient, non-blocking notice for a counted violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub category: ViolationCategory,
    pub count: u32,
    pub limit: u32,
    pub message: String,
}

/// Blocking screen shown when the session is ended automatically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Takeover {
    pub reason: FinalizeReason,
    pub message: String,
    pub count: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitFailure {
    /// Automatic submissions ask the candidate to retry by hand.
    pub automatic: bool,
    pub message: String,
}

/// Everything the UI renders, published after every event.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub exam_id: i64,
    pub title: Option<String>,
    pub questions: Vec<Question>,
    pub time_remaining: u64,
    pub current_question_index: usize,
    pub answers: BTreeMap<i64, Answer>,
    pub marked_for_review: BTreeSet<i64>,
    pub violations: Vec<ViolationStatus>,
    pub face_count: Option<usize>,
    pub is_full_screen: bool,
    /// The blocking "return to fullscreen" overlay.
    pub fullscreen_required: bool,
    pub recording: RecordingFlags,
    pub tracks: Vec<TrackStatus>,
    pub warning: Option<Warning>,
    pub takeover: Option<Takeover>,
    pub submit_error: Option<SubmitFailure>,
    /// Device acquisition failure blocking entry.
    pub environment_error: Option<String>,
    pub result: Option<SubmitReceipt>,
    /// Set once finalize ran while the page was fullscreen.
    pub exit_fullscreen: bool,
}

impl SessionSnapshot {
    pub fn loading(exam_id: i64) -> Self {
        Self {
            status: SessionStatus::Loading,
            exam_id,
            title: None,
            questions: Vec::new(),
            time_remaining: 0,
            current_question_index: 0,
            answers: BTreeMap::new(),
            marked_for_review: BTreeSet::new(),
            violations: Vec::new(),
            face_count: None,
            is_full_screen: false,
            fullscreen_required: false,
            recording: RecordingFlags::default(),
            tracks: Vec::new(),
            warning: None,
            takeover: None,
            submit_error: None,
            environment_error: None,
            result: None,
            exit_fullscreen: false,
        }
    }

    pub fn violation(&self, category: ViolationCategory) -> Option<&ViolationStatus> {
        self.violations.iter().find(|v| v.category == category)
    }
}
