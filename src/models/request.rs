// src/models/request.rs

use serde::Deserialize;
use validator::Validate;

use crate::{
    models::{activity::ActivityKind, answer::TestCaseResult, media::StreamKind},
    services::bridge::TrackAnnouncement,
};

/// DTO for selecting an option on a choice question.
#[derive(Debug, Deserialize)]
pub struct SelectAnswerRequest {
    pub index: usize,
    pub option: usize,
}

/// DTO for the editor's latest code.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCodeRequest {
    pub index: usize,

    #[validate(length(max = 100000, message = "Code is too long"))]
    pub code: String,

    #[validate(length(min = 1, max = 32, message = "Language must be 1-32 characters"))]
    pub language: String,
}

/// DTO for the outcome of a judge run.
#[derive(Debug, Deserialize, Validate)]
pub struct RunResultRequest {
    pub index: usize,
    pub passed: bool,

    #[validate(length(max = 100), nested)]
    #[serde(default)]
    pub test_results: Vec<TestCaseResult>,
}

/// DTO carrying only a question index (mark toggle, navigation).
#[derive(Debug, Deserialize)]
pub struct QuestionIndexRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub hidden: bool,
}

#[derive(Debug, Deserialize)]
pub struct FullscreenRequest {
    pub active: bool,
}

/// Clipboard and context-menu actions the page intercepted.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedAction {
    Copy,
    Cut,
    Paste,
    ContextMenu,
}

impl From<BlockedAction> for ActivityKind {
    fn from(action: BlockedAction) -> Self {
        match action {
            BlockedAction::Copy => ActivityKind::Copy,
            BlockedAction::Cut => ActivityKind::Cut,
            BlockedAction::Paste => ActivityKind::Paste,
            BlockedAction::ContextMenu => ActivityKind::ContextMenu,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BlockedInputRequest {
    pub kind: BlockedAction,

    #[validate(length(max = 1000))]
    pub detail: Option<String>,
}

/// DTO announcing a stream the browser has been granted.
#[derive(Debug, Deserialize, Validate)]
pub struct StreamAnnouncementRequest {
    pub stream: StreamKind,

    #[validate(length(min = 1, max = 8, message = "A stream has 1-8 tracks"))]
    pub tracks: Vec<TrackAnnouncement>,
}

/// Raster size of a posted preview frame; the body is raw RGBA8.
#[derive(Debug, Deserialize)]
pub struct FrameQuery {
    pub width: u32,
    pub height: u32,
}
