// src/session/handle.rs

use tokio::sync::{
    mpsc::{self, UnboundedSender},
    oneshot, watch,
};

use crate::{
    config::SessionConfig,
    error::AppError,
    models::{
        activity::ActivityKind,
        answer::TestCaseResult,
        media::StreamKind,
        payload::SubmitReceipt,
    },
    services::Services,
    session::{
        controller::SessionController,
        event::{Reply, SessionEvent},
        snapshot::SessionSnapshot,
    },
};

/// Cloneable front door to a running session controller.
#[derive(Clone)]
pub struct SessionHandle {
    events: UnboundedSender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Spawns the controller task and returns the first handle to it.
    pub fn spawn(
        exam_id: i64,
        candidate: impl Into<String>,
        services: Services,
        config: SessionConfig,
    ) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::loading(exam_id));
        let controller = SessionController::new(
            exam_id,
            candidate.into(),
            services,
            config.normalized(),
            events.downgrade(),
            snapshot_tx,
        );
        tokio::spawn(controller.run(inbox));
        Self { events, snapshot }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionEvent,
    ) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(build(reply))
            .map_err(|_| AppError::InternalServerError("Session controller stopped".to_string()))?;
        response
            .await
            .map_err(|_| AppError::InternalServerError("Session controller stopped".to_string()))?
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Session controller stopped, dropping event");
        }
    }

    pub async fn start(&self) -> Result<(), AppError> {
        self.request(SessionEvent::Start).await
    }

    pub async fn select_answer(&self, index: usize, option: usize) -> Result<(), AppError> {
        self.request(|reply| SessionEvent::SelectAnswer {
            index,
            option,
            reply,
        })
        .await
    }

    pub async fn update_code(
        &self,
        index: usize,
        code: String,
        language: String,
    ) -> Result<(), AppError> {
        self.request(|reply| SessionEvent::UpdateCode {
            index,
            code,
            language,
            reply,
        })
        .await
    }

    pub async fn record_run(
        &self,
        index: usize,
        passed: bool,
        test_results: Vec<TestCaseResult>,
    ) -> Result<(), AppError> {
        self.request(|reply| SessionEvent::RecordRun {
            index,
            passed,
            test_results,
            reply,
        })
        .await
    }

    pub async fn toggle_mark(&self, index: usize) -> Result<bool, AppError> {
        self.request(|reply| SessionEvent::ToggleMark { index, reply })
            .await
    }

    pub async fn go_to(&self, index: usize) -> Result<(), AppError> {
        self.request(|reply| SessionEvent::GoTo { index, reply })
            .await
    }

    /// Flushes answers, then moves to the next question. Returns the new index.
    pub async fn save_and_next(&self) -> Result<usize, AppError> {
        self.request(SessionEvent::SaveAndNext).await
    }

    pub async fn submit(&self) -> Result<SubmitReceipt, AppError> {
        self.request(SessionEvent::Submit).await
    }

    pub fn visibility_changed(&self, hidden: bool) {
        self.emit(SessionEvent::Visibility { hidden });
    }

    pub fn fullscreen_changed(&self, active: bool) {
        self.emit(SessionEvent::Fullscreen { active });
    }

    pub fn blocked_input(&self, kind: ActivityKind, detail: Option<String>) {
        self.emit(SessionEvent::BlockedInput { kind, detail });
    }

    pub fn screen_share_ended(&self) {
        self.emit(SessionEvent::ScreenShareEnded);
    }

    pub fn push_chunk(&self, stream: StreamKind, data: Vec<u8>) {
        self.emit(SessionEvent::Chunk { stream, data });
    }
}
