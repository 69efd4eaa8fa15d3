// tests/common/mod.rs

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use proctor::{
    config::SessionConfig,
    error::AppError,
    models::{
        attempt::{AttemptStatus, ExamAttempt},
        exam::{Exam, ProctoringConfig},
        media::{BoundingBox, FaceDetection, Frame, Landmarks, Point, StreamKind},
        payload::{AutosavePayload, SubmitPayload, SubmitReceipt},
        question::{CodingSpec, Question, QuestionKind},
    },
    services::{
        AttemptProvider, AutosaveSink, ExamProvider, RecordingSink, Services, SubmitSink,
        bridge::{BrowserBridge, TrackAnnouncement},
    },
    session::{SessionHandle, SessionSnapshot, media::TrackSource},
};

pub const EXAM_ID: i64 = 42;
pub const CANDIDATE: &str = "candidate-1";

/// In-memory exam backend that records every call.
pub struct MemoryBackend {
    exam: Exam,
    questions: Vec<Question>,
    attempt: Mutex<Option<ExamAttempt>>,
    receipt: Mutex<Option<SubmitReceipt>>,
    pub autosaves: Mutex<Vec<AutosavePayload>>,
    pub submits: Mutex<Vec<SubmitPayload>>,
    pub uploads: Mutex<Vec<(Option<Vec<u8>>, Option<Vec<u8>>)>>,
    /// Number of upcoming submit calls that fail.
    pub failing_submits: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(proctoring: ProctoringConfig) -> Self {
        Self {
            exam: Exam {
                id: EXAM_ID,
                title: "Systems Programming".to_string(),
                duration_minutes: 10,
                proctoring,
            },
            questions: questions(),
            attempt: Mutex::new(None),
            receipt: Mutex::new(None),
            autosaves: Mutex::new(Vec::new()),
            submits: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            failing_submits: AtomicUsize::new(0),
        }
    }

    pub fn with_attempt(self, attempt: ExamAttempt) -> Self {
        *self.attempt.lock().unwrap() = Some(attempt);
        self
    }

    pub fn fail_next_submits(&self, count: usize) {
        self.failing_submits.store(count, Ordering::SeqCst);
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    pub fn attempt_status(&self) -> Option<AttemptStatus> {
        self.attempt.lock().unwrap().as_ref().map(|a| a.status)
    }
}

#[async_trait]
impl ExamProvider for MemoryBackend {
    async fn get_exam(&self, exam_id: i64) -> Result<Exam, AppError> {
        if exam_id != self.exam.id {
            return Err(AppError::NotFound("Exam not found".to_string()));
        }
        Ok(self.exam.clone())
    }

    async fn get_questions(&self, _exam_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self.questions.clone())
    }
}

#[async_trait]
impl AttemptProvider for MemoryBackend {
    async fn resume_attempt(&self, _exam_id: i64, _candidate: &str) -> Result<Option<ExamAttempt>, AppError> {
        Ok(self.attempt.lock().unwrap().clone())
    }

    async fn start_attempt(&self, exam_id: i64, candidate: &str) -> Result<ExamAttempt, AppError> {
        let mut attempt = self.attempt.lock().unwrap();
        let attempt = attempt.get_or_insert_with(|| ExamAttempt {
            exam_id,
            candidate: candidate.to_string(),
            started_at: Utc::now(),
            status: AttemptStatus::InProgress,
            answers: Default::default(),
            marked_for_review: Default::default(),
        });
        Ok(attempt.clone())
    }
}

#[async_trait]
impl AutosaveSink for MemoryBackend {
    async fn autosave(&self, payload: &AutosavePayload) -> Result<(), AppError> {
        self.autosaves.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[async_trait]
impl SubmitSink for MemoryBackend {
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmitReceipt, AppError> {
        if self
            .failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::Upstream("submit endpoint unreachable".to_string()));
        }

        let mut receipt = self.receipt.lock().unwrap();
        if let Some(receipt) = receipt.as_ref() {
            return Ok(receipt.clone());
        }

        self.submits.lock().unwrap().push(payload.clone());
        if let Some(attempt) = self.attempt.lock().unwrap().as_mut() {
            attempt.status = AttemptStatus::Submitted;
        }
        let issued = SubmitReceipt {
            score: payload.answers.len() as i64,
            total: self.questions.len() as i64,
            submission_type: payload.submission_type,
            submitted_at: Utc::now(),
        };
        *receipt = Some(issued.clone());
        Ok(issued)
    }
}

#[async_trait]
impl RecordingSink for MemoryBackend {
    async fn upload_recording(
        &self,
        _exam_id: i64,
        _candidate: &str,
        webcam: Option<Vec<u8>>,
        screen: Option<Vec<u8>>,
    ) -> Result<(), AppError> {
        self.uploads.lock().unwrap().push((webcam, screen));
        Ok(())
    }
}

pub fn questions() -> Vec<Question> {
    vec![
        Question {
            id: 1,
            kind: QuestionKind::Choice,
            content: "Which type owns heap memory?".to_string(),
            options: vec!["&str".into(), "String".into(), "char".into()],
            coding: None,
        },
        Question {
            id: 2,
            kind: QuestionKind::Coding,
            content: "Reverse a string".to_string(),
            options: vec![],
            coding: Some(CodingSpec {
                languages: vec!["python".into()],
                starter_code: None,
                test_case_count: 2,
            }),
        },
        Question {
            id: 3,
            kind: QuestionKind::Choice,
            content: "Which port does HTTPS use?".to_string(),
            options: vec!["80".into(), "443".into()],
            coding: None,
        },
    ]
}

/// No camera, no screen, no fullscreen: only focus loss is proctored.
pub fn focus_only(focus_loss_limit: u32) -> ProctoringConfig {
    ProctoringConfig {
        camera_required: false,
        screen_required: false,
        fullscreen_required: false,
        focus_loss_limit,
        face_sensitivity: 0.5,
    }
}

pub fn camera_proctoring() -> ProctoringConfig {
    ProctoringConfig {
        camera_required: true,
        screen_required: false,
        fullscreen_required: false,
        focus_loss_limit: 3,
        face_sensitivity: 0.5,
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        autosave_interval: Duration::from_secs(5),
        poll_interval: Duration::from_secs(1),
        darkness_threshold: 40.0,
    }
}

/// A bridge with a live camera + microphone and a bright preview frame.
pub fn camera_bridge() -> BrowserBridge {
    // The preview frame is posted once, so it must not age out mid-test.
    let bridge = BrowserBridge::with_max_age(Duration::from_secs(24 * 3600));
    bridge
        .announce_stream(
            StreamKind::Webcam,
            vec![
                TrackAnnouncement {
                    id: "cam".into(),
                    source: TrackSource::Camera,
                },
                TrackAnnouncement {
                    id: "mic".into(),
                    source: TrackSource::Microphone,
                },
            ],
        )
        .unwrap();
    bridge.set_frame(Frame::new(8, 8, [200, 200, 200, 255].repeat(64)).unwrap());
    bridge
}

pub fn announce_screen(bridge: &BrowserBridge) {
    bridge
        .announce_stream(
            StreamKind::Screen,
            vec![
                TrackAnnouncement {
                    id: "screen".into(),
                    source: TrackSource::Screen,
                },
                TrackAnnouncement {
                    id: "system".into(),
                    source: TrackSource::SystemAudio,
                },
            ],
        )
        .unwrap();
}

/// A face looking straight at the camera.
pub fn face() -> FaceDetection {
    FaceDetection {
        bounding_box: BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        },
        landmarks: Some(Landmarks {
            nose: Point { x: 50.0, y: 50.0 },
            jaw: vec![Point { x: 10.0, y: 40.0 }, Point { x: 90.0, y: 40.0 }],
        }),
    }
}

/// A single face with the nose at 15% of the jaw width, outside the straight band.
pub fn turned_face() -> FaceDetection {
    let mut detection = face();
    if let Some(landmarks) = detection.landmarks.as_mut() {
        landmarks.nose = Point { x: 22.0, y: 50.0 };
    }
    detection
}

pub fn services(backend: &Arc<MemoryBackend>, bridge: &BrowserBridge) -> Services {
    let bridge = Arc::new(bridge.clone());
    Services {
        exams: backend.clone(),
        attempts: backend.clone(),
        autosave: backend.clone(),
        submit: backend.clone(),
        recordings: backend.clone(),
        detector: bridge.clone(),
        frames: bridge.clone(),
        devices: bridge,
    }
}

pub fn spawn_session(backend: &Arc<MemoryBackend>, bridge: &BrowserBridge) -> SessionHandle {
    SessionHandle::spawn(EXAM_ID, CANDIDATE, services(backend, bridge), session_config())
}

/// Waits (in virtual time) until the published snapshot satisfies `predicate`.
pub async fn wait_for(
    session: &SessionHandle,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = session.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(120), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session controller stopped")
        .clone();
    snapshot
}
