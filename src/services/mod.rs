// src/services/mod.rs

//! Contracts for everything the session engine consumes but does not own:
//! the exam backend, the face-landmark model and the browser's media devices.

pub mod bridge;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::ExamAttempt,
        exam::Exam,
        media::{FaceDetection, Frame},
        payload::{AutosavePayload, SubmitPayload, SubmitReceipt},
        question::Question,
    },
    session::media::MediaStream,
};

#[async_trait]
pub trait ExamProvider: Send + Sync {
    async fn get_exam(&self, exam_id: i64) -> Result<Exam, AppError>;

    /// Questions in presentation order.
    async fn get_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError>;
}

#[async_trait]
pub trait AttemptProvider: Send + Sync {
    async fn resume_attempt(
        &self,
        exam_id: i64,
        candidate: &str,
    ) -> Result<Option<ExamAttempt>, AppError>;

    /// Creates the attempt with a server-side `started_at`, or returns the existing one.
    async fn start_attempt(&self, exam_id: i64, candidate: &str) -> Result<ExamAttempt, AppError>;
}

/// Last-write-wins upsert keyed by (exam, candidate). A no-op once submitted.
#[async_trait]
pub trait AutosaveSink: Send + Sync {
    async fn autosave(&self, payload: &AutosavePayload) -> Result<(), AppError>;
}

/// Must return the stored receipt when the attempt is already submitted.
#[async_trait]
pub trait SubmitSink: Send + Sync {
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmitReceipt, AppError>;
}

#[async_trait]
pub trait RecordingSink: Send + Sync {
    async fn upload_recording(
        &self,
        exam_id: i64,
        candidate: &str,
        webcam: Option<Vec<u8>>,
        screen: Option<Vec<u8>>,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// False until the landmark model has loaded.
    fn is_ready(&self) -> bool;

    async fn detect_faces(
        &self,
        frame: &Frame,
        sensitivity: f32,
    ) -> Result<Vec<FaceDetection>, AppError>;
}

/// Read-only view of the live camera preview.
pub trait FrameSource: Send + Sync {
    fn latest_frame(&self) -> Option<Frame>;
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Camera video plus microphone audio.
    async fn open_camera(&self) -> Result<MediaStream, AppError>;

    /// Screen video plus system audio when the candidate shared it.
    async fn open_screen(&self) -> Result<MediaStream, AppError>;
}

/// Handles to every collaborator a session needs.
#[derive(Clone)]
pub struct Services {
    pub exams: Arc<dyn ExamProvider>,
    pub attempts: Arc<dyn AttemptProvider>,
    pub autosave: Arc<dyn AutosaveSink>,
    pub submit: Arc<dyn SubmitSink>,
    pub recordings: Arc<dyn RecordingSink>,
    pub detector: Arc<dyn FaceDetector>,
    pub frames: Arc<dyn FrameSource>,
    pub devices: Arc<dyn MediaDevices>,
}
