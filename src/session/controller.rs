// src/session/controller.rs

//! The session state machine: `Loading -> Active -> Finalizing -> Terminated`.
//!
//! One task owns every piece of session state. Monitors, the clock and the
//! HTTP layer only send `SessionEvent`s into its mailbox, so events are handled
//! strictly one at a time in arrival order.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, WeakUnboundedSender},
        watch,
    },
    task::JoinHandle,
    time::{Instant, interval_at, sleep, timeout},
};

use crate::{
    config::{AUTOSAVE_TIMEOUT, FOCUS_LOSS_DEBOUNCE, SessionConfig},
    error::AppError,
    models::{
        activity::{ActivityKind, ActivityLogEntry},
        attempt::{AttemptStatus, remaining_seconds},
        exam::{Exam, ProctoringConfig},
        payload::{SubmitPayload, SubmitReceipt},
        question::Question,
    },
    services::Services,
    session::{
        answers::AnswerStore,
        clock::Clock,
        device::spawn_device_poller,
        event::{Reply, SaveMark, SessionEvent},
        focus::{FocusEdge, FocusMonitor, FocusSignal},
        presence::{PresenceReading, spawn_presence_monitor},
        recording::RecordingManager,
        snapshot::{
            FinalizeReason, SessionSnapshot, SessionStatus, SubmitFailure, Takeover, Warning,
        },
        violation::{Observation, ViolationBoard, ViolationCategory},
    },
    utils::html::clean_text,
};

/// Background work that only runs while the session is `Active`.
#[derive(Default)]
struct MonitorSet {
    clock: Option<Clock>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorSet {
    fn shutdown(&mut self) {
        if let Some(clock) = self.clock.take() {
            clock.stop();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MonitorSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct SessionController {
    exam_id: i64,
    candidate: String,
    services: Services,
    config: SessionConfig,
    status: SessionStatus,

    /// Set while a finalize is running. The only gate in front of the submit sink.
    finalizing: bool,

    exam: Option<Exam>,
    questions: Vec<Question>,
    answers: AnswerStore,
    activity: Vec<ActivityLogEntry>,
    violations: ViolationBoard,
    focus: FocusMonitor,
    recording: Option<RecordingManager>,
    monitors: MonitorSet,
    time_remaining: u64,
    current_index: usize,
    face_count: Option<usize>,
    saved: SaveMark,
    autosave_in_flight: bool,
    warning: Option<Warning>,
    takeover: Option<Takeover>,
    submit_error: Option<SubmitFailure>,
    environment_error: Option<String>,
    receipt: Option<SubmitReceipt>,
    exit_fullscreen: bool,
    events: WeakUnboundedSender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    pub fn new(
        exam_id: i64,
        candidate: String,
        services: Services,
        config: SessionConfig,
        events: WeakUnboundedSender<SessionEvent>,
        snapshot: watch::Sender<SessionSnapshot>,
    ) -> Self {
        Self {
            exam_id,
            candidate,
            services,
            config,
            status: SessionStatus::Loading,
            finalizing: false,
            exam: None,
            questions: Vec::new(),
            answers: AnswerStore::default(),
            activity: Vec::new(),
            violations: ViolationBoard::default(),
            focus: FocusMonitor::new(false, FOCUS_LOSS_DEBOUNCE),
            recording: None,
            monitors: MonitorSet::default(),
            time_remaining: 0,
            current_index: 0,
            face_count: None,
            saved: SaveMark::default(),
            autosave_in_flight: false,
            warning: None,
            takeover: None,
            submit_error: None,
            environment_error: None,
            receipt: None,
            exit_fullscreen: false,
            events,
            snapshot,
        }
    }

    pub async fn run(mut self, mut inbox: UnboundedReceiver<SessionEvent>) {
        self.publish();
        while let Some(event) = inbox.recv().await {
            self.handle(event).await;
            self.publish();
        }
        self.teardown();
        tracing::debug!(exam_id = self.exam_id, "Session controller stopped");
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Start(reply) => {
                let result = self.start().await;
                self.respond(reply, result);
            }
            SessionEvent::SelectAnswer {
                index,
                option,
                reply,
            } => {
                let result = self.with_answers(|store| store.select(index, option));
                self.respond(reply, result);
            }
            SessionEvent::UpdateCode {
                index,
                code,
                language,
                reply,
            } => {
                let result = self.with_answers(|store| store.update_code(index, code, language));
                self.respond(reply, result);
            }
            SessionEvent::RecordRun {
                index,
                passed,
                test_results,
                reply,
            } => {
                let result =
                    self.with_answers(|store| store.record_run(index, passed, test_results));
                self.respond(reply, result);
            }
            SessionEvent::ToggleMark { index, reply } => {
                let result = self.with_answers(|store| store.toggle_mark(index));
                self.respond(reply, result);
            }
            SessionEvent::GoTo { index, reply } => {
                let result = self.go_to(index);
                self.respond(reply, result);
            }
            SessionEvent::SaveAndNext(reply) => {
                let result = self.save_and_next().await;
                self.respond(reply, result);
            }
            SessionEvent::Submit(reply) => {
                let result = self.finalize(FinalizeReason::Manual).await;
                self.respond(reply, result);
            }
            SessionEvent::Tick(left) => {
                if self.status == SessionStatus::Active {
                    self.time_remaining = left;
                }
            }
            SessionEvent::TimeUp => self.on_time_up().await,
            SessionEvent::Visibility { hidden } => {
                self.on_focus_signal(FocusSignal::Visibility { hidden }).await
            }
            SessionEvent::Fullscreen { active } => {
                self.on_focus_signal(FocusSignal::Fullscreen { active }).await
            }
            SessionEvent::FocusSettle => self.on_focus_settle().await,
            SessionEvent::BlockedInput { kind, detail } => self.on_blocked_input(kind, detail),
            SessionEvent::ScreenShareEnded => self.on_screen_share_ended().await,
            SessionEvent::Chunk { stream, data } => {
                let accepted = self.status == SessionStatus::Active
                    && self
                        .recording
                        .as_mut()
                        .is_some_and(|r| r.push_chunk(stream, data));
                if !accepted {
                    tracing::debug!(stream = stream.as_str(), "Dropping media chunk");
                }
            }
            SessionEvent::DeviceCheck(fault) => {
                let message = fault.map(|f| f.describe()).unwrap_or_default();
                self.observe(
                    ViolationCategory::DeviceIntegrity,
                    fault.is_some(),
                    ActivityKind::DeviceIntegrity,
                    message,
                )
                .await;
            }
            SessionEvent::Presence(reading) => self.on_presence(reading).await,
            SessionEvent::AutosaveTick => self.schedule_autosave(),
            SessionEvent::AutosaveDone { mark, result } => {
                self.autosave_in_flight = false;
                match result {
                    Ok(()) => {
                        self.saved.merge(mark);
                        tracing::debug!(revision = mark.revision, "Autosave completed");
                    }
                    Err(e) => tracing::warn!("Autosave failed, retrying on next tick: {}", e),
                }
            }
        }
    }

    /// Publishes first so the caller sees the state its command produced.
    fn respond<T>(&self, reply: Reply<T>, result: Result<T, AppError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn ensure_active(&self) -> Result<(), AppError> {
        match self.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Loading => Err(AppError::Conflict("Session has not started".to_string())),
            SessionStatus::Finalizing => {
                Err(AppError::Conflict("Session is being submitted".to_string()))
            }
            SessionStatus::Terminated => {
                Err(AppError::Conflict("Attempt already submitted".to_string()))
            }
        }
    }

    fn with_answers<T>(
        &mut self,
        command: impl FnOnce(&mut AnswerStore) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        self.ensure_active()?;
        command(&mut self.answers)
    }

    async fn start(&mut self) -> Result<(), AppError> {
        match self.status {
            SessionStatus::Loading => {}
            SessionStatus::Active => return Ok(()),
            SessionStatus::Finalizing | SessionStatus::Terminated => {
                return Err(AppError::Conflict("Attempt already submitted".to_string()));
            }
        }

        let exam = self.services.exams.get_exam(self.exam_id).await?;
        let questions = self.services.exams.get_questions(self.exam_id).await?;
        if questions.is_empty() {
            return Err(AppError::NotFound("Exam has no questions".to_string()));
        }

        let attempt = match self
            .services
            .attempts
            .resume_attempt(self.exam_id, &self.candidate)
            .await?
        {
            Some(attempt) => attempt,
            None => {
                self.services
                    .attempts
                    .start_attempt(self.exam_id, &self.candidate)
                    .await?
            }
        };
        if attempt.status == AttemptStatus::Submitted {
            self.status = SessionStatus::Terminated;
            return Err(AppError::Conflict("Attempt already submitted".to_string()));
        }

        let recording =
            match RecordingManager::acquire(self.services.devices.as_ref(), &exam.proctoring).await
            {
                Ok(recording) => recording,
                Err(e) => {
                    tracing::warn!("Media acquisition failed: {}", e);
                    self.environment_error = Some(match &e {
                        AppError::Unavailable(msg) => msg.clone(),
                        other => other.to_string(),
                    });
                    return Err(e);
                }
            };
        self.environment_error = None;

        let mut answers = AnswerStore::new(&questions);
        answers.restore(attempt.answers, attempt.marked_for_review);
        self.answers = answers;
        self.saved = self.current_mark();
        self.violations = ViolationBoard::new(&exam.proctoring);
        self.focus
            .set_fullscreen_required(exam.proctoring.fullscreen_required);
        self.time_remaining = remaining_seconds(exam.duration_minutes, attempt.started_at, Utc::now());
        self.status = SessionStatus::Active;

        self.spawn_monitors(&exam.proctoring, &recording);
        tracing::info!(
            exam_id = self.exam_id,
            candidate = %self.candidate,
            time_remaining = self.time_remaining,
            resumed_answers = self.answers.answers().len(),
            "Session active"
        );

        self.recording = Some(recording);
        self.exam = Some(exam);
        self.questions = questions;
        Ok(())
    }

    fn spawn_monitors(&mut self, proctoring: &ProctoringConfig, recording: &RecordingManager) {
        let Some(events) = self.events.upgrade() else {
            return;
        };

        let tick_tx = events.clone();
        let expire_tx = events.clone();
        self.monitors.clock = Some(Clock::start(
            self.time_remaining,
            move |left| {
                let _ = tick_tx.send(SessionEvent::Tick(left));
            },
            move || {
                let _ = expire_tx.send(SessionEvent::TimeUp);
            },
        ));

        let autosave_tx = events.clone();
        let period = self.config.autosave_interval;
        self.monitors.tasks.push(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if autosave_tx.send(SessionEvent::AutosaveTick).is_err() {
                    break;
                }
            }
        }));

        let watched = recording.watched_tracks();
        if watched.camera.is_some() || watched.screen.is_some() {
            self.monitors.tasks.push(spawn_device_poller(
                watched,
                Arc::clone(&self.services.frames),
                &self.config,
                events.clone(),
            ));
        }

        if proctoring.camera_required && recording.has_camera() {
            self.monitors.tasks.push(spawn_presence_monitor(
                Arc::clone(&self.services.frames),
                Arc::clone(&self.services.detector),
                proctoring.face_sensitivity,
                &self.config,
                events,
            ));
        }
    }

    fn go_to(&mut self, index: usize) -> Result<(), AppError> {
        self.ensure_active()?;
        if index >= self.answers.len() {
            return Err(AppError::BadRequest(format!("No question at index {}", index)));
        }
        self.current_index = index;
        Ok(())
    }

    async fn save_and_next(&mut self) -> Result<usize, AppError> {
        self.ensure_active()?;
        if let Err(e) = self.flush_now().await {
            tracing::warn!("Autosave before navigation failed: {}", e);
        }
        if self.current_index + 1 < self.answers.len() {
            self.current_index += 1;
        }
        Ok(self.current_index)
    }

    async fn on_time_up(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }
        self.time_remaining = 0;
        tracing::info!(exam_id = self.exam_id, "Time is up");
        self.takeover = Some(Takeover {
            reason: FinalizeReason::TimeUp,
            message: "Time is up. Your answers are being submitted.".to_string(),
            count: None,
            limit: None,
        });
        let _ = self.finalize(FinalizeReason::TimeUp).await;
    }

    async fn on_focus_signal(&mut self, signal: FocusSignal) {
        // A restore whose window closed while this signal was queued goes first.
        self.on_focus_settle().await;
        let edge = self.focus.apply(signal, Instant::now());
        if self.status != SessionStatus::Active {
            return;
        }
        match edge {
            FocusEdge::Lost(kind) => {
                let message = match kind {
                    ActivityKind::FullscreenExit => "Exited fullscreen mode",
                    _ => "Switched away from the exam tab",
                };
                self.observe(ViolationCategory::FocusLoss, true, kind, message)
                    .await;
            }
            FocusEdge::Restored => {
                self.observe(
                    ViolationCategory::FocusLoss,
                    false,
                    ActivityKind::TabSwitch,
                    "",
                )
                .await;
            }
            FocusEdge::Settling(delay) => {
                tracing::debug!(?delay, "Focus back within debounce window");
                self.schedule_focus_settle(delay);
            }
            FocusEdge::None => {}
        }
    }

    async fn on_focus_settle(&mut self) {
        if self.focus.settle(Instant::now()) != FocusEdge::Restored
            || self.status != SessionStatus::Active
        {
            return;
        }
        self.observe(
            ViolationCategory::FocusLoss,
            false,
            ActivityKind::TabSwitch,
            "",
        )
        .await;
    }

    fn schedule_focus_settle(&mut self, delay: Duration) {
        let Some(events) = self.events.upgrade() else {
            return;
        };
        self.monitors.tasks.retain(|task| !task.is_finished());
        self.monitors.tasks.push(tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(SessionEvent::FocusSettle);
        }));
    }

    fn on_blocked_input(&mut self, kind: ActivityKind, detail: Option<String>) {
        if self.status != SessionStatus::Active {
            return;
        }
        let action = match kind {
            ActivityKind::Copy => "Copy attempt blocked",
            ActivityKind::Cut => "Cut attempt blocked",
            ActivityKind::Paste => "Paste attempt blocked",
            ActivityKind::ContextMenu => "Context menu blocked",
            _ => "Action blocked",
        };
        let message = match detail.map(|d| clean_text(&d)).filter(|d| !d.is_empty()) {
            Some(detail) => format!("{}: {}", action, detail),
            None => action.to_string(),
        };
        tracing::info!(kind = ?kind, "{}", message);
        self.log_activity(kind, message);
    }

    async fn on_screen_share_ended(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }
        self.log_activity(ActivityKind::ScreenShareStopped, "Screen sharing was stopped");
        self.takeover = Some(Takeover {
            reason: FinalizeReason::ScreenShareStopped,
            message: "Screen sharing was stopped. Your exam is being submitted.".to_string(),
            count: None,
            limit: None,
        });
        let _ = self.finalize(FinalizeReason::ScreenShareStopped).await;
    }

    async fn on_presence(&mut self, reading: PresenceReading) {
        if self.status != SessionStatus::Active {
            return;
        }
        self.face_count = Some(reading.face_count);

        let checks = [
            (
                ViolationCategory::MultipleFaces,
                reading.face_count > 1,
                ActivityKind::MultipleFaces,
                "Multiple faces detected",
            ),
            (
                ViolationCategory::AbsentFace,
                reading.face_count == 0,
                ActivityKind::FaceAbsent,
                "No face detected",
            ),
            (
                ViolationCategory::HeadTurned,
                reading.face_count == 1 && reading.head_turned,
                ActivityKind::HeadTurned,
                "Head turned away from the screen",
            ),
        ];
        for (category, condition, kind, message) in checks {
            self.observe(category, condition, kind, message).await;
        }
    }

    /// Feeds one counter and acts on the outcome. Escalation finalizes.
    async fn observe(
        &mut self,
        category: ViolationCategory,
        condition: bool,
        kind: ActivityKind,
        message: &str,
    ) {
        if self.status != SessionStatus::Active {
            return;
        }
        match self.violations.observe(category, condition) {
            Observation::Warned { count, limit } => {
                tracing::warn!(?category, count, limit, "{}", message);
                self.log_activity(kind, format!("{} ({}/{})", message, count, limit));
                self.warning = Some(Warning {
                    category,
                    count,
                    limit,
                    message: format!("{}. Warning {} of {}.", message, count, limit),
                });
            }
            Observation::Escalated { count, limit } => {
                tracing::warn!(?category, count, limit, "Violation limit reached");
                self.log_activity(
                    kind,
                    format!("{} ({}/{}), limit reached", message, count, limit),
                );
                self.warning = None;
                self.takeover = Some(Takeover {
                    reason: FinalizeReason::Violation(category),
                    message: format!(
                        "{}: limit of {} reached. Your exam is being submitted.",
                        category.label(),
                        limit
                    ),
                    count: Some(count),
                    limit: Some(limit),
                });
                let _ = self.finalize(FinalizeReason::Violation(category)).await;
            }
            Observation::Cleared | Observation::Unchanged => {}
        }
    }

    fn log_activity(&mut self, kind: ActivityKind, message: impl Into<String>) {
        self.activity.push(ActivityLogEntry::new(kind, message));
    }

    fn current_mark(&self) -> SaveMark {
        SaveMark {
            revision: self.answers.revision(),
            activity_len: self.activity.len(),
        }
    }

    fn schedule_autosave(&mut self) {
        if self.status != SessionStatus::Active || self.autosave_in_flight {
            return;
        }
        let mark = self.current_mark();
        if self.saved.covers(&mark) {
            return;
        }
        let Some(events) = self.events.upgrade() else {
            return;
        };

        let payload = self
            .answers
            .autosave_payload(self.exam_id, &self.candidate, &self.activity);
        let sink = Arc::clone(&self.services.autosave);
        self.autosave_in_flight = true;
        tokio::spawn(async move {
            let result = match timeout(AUTOSAVE_TIMEOUT, sink.autosave(&payload)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Upstream("Autosave timed out".to_string())),
            };
            let _ = events.send(SessionEvent::AutosaveDone { mark, result });
        });
    }

    /// Awaited flush, used before navigation and before submission.
    async fn flush_now(&mut self) -> Result<(), AppError> {
        let mark = self.current_mark();
        let payload = self
            .answers
            .autosave_payload(self.exam_id, &self.candidate, &self.activity);
        match timeout(AUTOSAVE_TIMEOUT, self.services.autosave.autosave(&payload)).await {
            Ok(Ok(())) => {
                self.saved.merge(mark);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::Upstream("Autosave timed out".to_string())),
        }
    }

    /// The single way out of `Active`. Only the first request gets through;
    /// a failed submission re-opens the gate for a manual retry.
    async fn finalize(&mut self, reason: FinalizeReason) -> Result<SubmitReceipt, AppError> {
        if let Some(receipt) = &self.receipt {
            return Ok(receipt.clone());
        }
        if self.finalizing || self.status != SessionStatus::Active {
            tracing::debug!(?reason, status = ?self.status, "Finalize request dropped");
            return Err(AppError::Conflict("Session is not active".to_string()));
        }

        self.finalizing = true;
        self.status = SessionStatus::Finalizing;
        self.submit_error = None;
        tracing::info!(
            exam_id = self.exam_id,
            candidate = %self.candidate,
            ?reason,
            "Finalizing session"
        );
        self.publish();

        if let Err(e) = self.flush_now().await {
            tracing::warn!("Final autosave failed: {}", e);
        }

        let payload = SubmitPayload {
            exam_id: self.exam_id,
            candidate: self.candidate.clone(),
            submission_type: reason.submission_type(),
            answers: self.answers.final_answers(),
            marked_for_review: self.answers.marked().clone(),
            activity_logs: self.activity.clone(),
        };

        let receipt = match self.services.submit.submit(&payload).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(?reason, "Submission failed: {}", e);
                self.finalizing = false;
                self.status = SessionStatus::Active;
                let automatic = reason.is_automatic();
                self.submit_error = Some(SubmitFailure {
                    automatic,
                    message: if automatic {
                        "Automatic submission failed. Please submit your exam manually."
                            .to_string()
                    } else {
                        "Submission failed. Please try again.".to_string()
                    },
                });
                return Err(e);
            }
        };

        self.upload_recordings().await;
        self.teardown();
        if self.focus.is_full_screen() {
            self.exit_fullscreen = true;
        }
        self.status = SessionStatus::Terminated;
        self.finalizing = false;
        tracing::info!(
            exam_id = self.exam_id,
            score = receipt.score,
            total = receipt.total,
            "Session terminated"
        );
        self.receipt = Some(receipt.clone());
        Ok(receipt)
    }

    /// Best effort: a failed upload never affects the submission.
    async fn upload_recordings(&mut self) {
        let Some(recording) = self.recording.as_mut() else {
            return;
        };
        let blobs = recording.stop();
        if blobs.is_empty() {
            return;
        }
        if let Err(e) = self
            .services
            .recordings
            .upload_recording(self.exam_id, &self.candidate, blobs.webcam, blobs.screen)
            .await
        {
            tracing::warn!("Recording upload failed: {}", e);
        }
    }

    /// Stops the clock, every poller and every captured track.
    fn teardown(&mut self) {
        self.monitors.shutdown();
        if let Some(recording) = self.recording.as_mut() {
            recording.release();
        }
    }

    fn publish(&self) {
        let recording = self.recording.as_ref();
        let snapshot = SessionSnapshot {
            status: self.status,
            exam_id: self.exam_id,
            title: self.exam.as_ref().map(|e| e.title.clone()),
            questions: self.questions.clone(),
            time_remaining: self.time_remaining,
            current_question_index: self.current_index,
            answers: self.answers.answers().clone(),
            marked_for_review: self.answers.marked().clone(),
            violations: self.violations.statuses(),
            face_count: self.face_count,
            is_full_screen: self.focus.is_full_screen(),
            fullscreen_required: self.status == SessionStatus::Active
                && self.focus.needs_fullscreen(),
            recording: recording.map(RecordingManager::flags).unwrap_or_default(),
            tracks: recording
                .map(RecordingManager::track_statuses)
                .unwrap_or_default(),
            warning: self.warning.clone(),
            takeover: self.takeover.clone(),
            submit_error: self.submit_error.clone(),
            environment_error: self.environment_error.clone(),
            result: self.receipt.clone(),
            exit_fullscreen: self.exit_fullscreen,
        };
        self.snapshot.send_replace(snapshot);
    }
}
