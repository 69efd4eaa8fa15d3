// src/services/bridge.rs

//! Browser-side sensors reported over HTTP.
//!
//! The page owns the real camera, microphone and screen capture. It announces
//! its tracks, pushes track state changes, sampled preview frames and the
//! face-landmark model's output here. The session engine reads them through
//! the `MediaDevices`, `FrameSource` and `FaceDetector` contracts.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    config::SENSOR_MAX_AGE,
    error::AppError,
    models::media::{FaceDetection, Frame, StreamKind},
    services::{FaceDetector, FrameSource, MediaDevices},
    session::media::{MediaStream, MediaTrack, TrackSource},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackAnnouncement {
    pub id: String,
    pub source: TrackSource,
}

/// Partial update pushed when the browser fires `mute`, `unmute` or `ended`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackUpdate {
    pub enabled: Option<bool>,
    pub muted: Option<bool>,
    #[serde(default)]
    pub ended: bool,
}

/// A value posted by the page and when it arrived.
struct Reported<T> {
    at: Instant,
    value: T,
}

impl<T: Clone> Reported<T> {
    fn now(value: T) -> Self {
        Self {
            at: Instant::now(),
            value,
        }
    }

    fn fresh(&self, max_age: Duration) -> Option<T> {
        (self.at.elapsed() <= max_age).then(|| self.value.clone())
    }
}

#[derive(Default)]
struct BridgeState {
    streams: HashMap<StreamKind, MediaStream>,
    tracks: HashMap<String, MediaTrack>,
    frame: Option<Reported<Frame>>,
    faces: Option<Reported<Vec<FaceDetection>>>,
}

/// Frames and face reports go stale after `max_age`; a page that stops
/// posting looks like a missing frame or an unloaded model.
#[derive(Clone)]
pub struct BrowserBridge {
    inner: Arc<Mutex<BridgeState>>,
    max_age: Duration,
}

impl Default for BrowserBridge {
    fn default() -> Self {
        Self::with_max_age(SENSOR_MAX_AGE)
    }
}

impl BrowserBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            inner: Arc::default(),
            max_age,
        }
    }

    fn state(&self) -> MutexGuard<'_, BridgeState> {
        // A panic elsewhere never leaves the maps half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers the tracks of a freshly granted stream, replacing any
    /// previous stream of the same kind.
    pub fn announce_stream(&self, kind: StreamKind, tracks: Vec<TrackAnnouncement>) -> Result<(), AppError> {
        if tracks.is_empty() {
            return Err(AppError::BadRequest("A stream needs at least one track".to_string()));
        }
        let tracks: Vec<MediaTrack> = tracks
            .into_iter()
            .map(|t| MediaTrack::new(t.id, t.source))
            .collect();

        let mut state = self.state();
        if let Some(previous) = state.streams.remove(&kind) {
            for track in previous.tracks() {
                state.tracks.remove(track.id());
            }
        }
        for track in &tracks {
            state.tracks.insert(track.id().to_string(), track.clone());
        }
        tracing::info!(stream = kind.as_str(), tracks = tracks.len(), "Stream announced");
        state.streams.insert(kind, MediaStream::new(tracks));
        Ok(())
    }

    pub fn update_track(&self, id: &str, update: TrackUpdate) -> Result<(), AppError> {
        let state = self.state();
        let track = state
            .tracks
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Unknown track {}", id)))?;
        if let Some(enabled) = update.enabled {
            track.set_enabled(enabled);
        }
        if let Some(muted) = update.muted {
            track.set_muted(muted);
        }
        if update.ended {
            tracing::info!(track = id, "Track ended by the browser");
            track.stop();
        }
        Ok(())
    }

    pub fn track(&self, id: &str) -> Option<MediaTrack> {
        self.state().tracks.get(id).cloned()
    }

    pub fn set_frame(&self, frame: Frame) {
        self.state().frame = Some(Reported::now(frame));
    }

    pub fn report_faces(&self, faces: Vec<FaceDetection>) {
        self.state().faces = Some(Reported::now(faces));
    }

    fn stream(&self, kind: StreamKind) -> Option<MediaStream> {
        self.state().streams.get(&kind).cloned()
    }
}

#[async_trait]
impl MediaDevices for BrowserBridge {
    async fn open_camera(&self) -> Result<MediaStream, AppError> {
        let stream = self
            .stream(StreamKind::Webcam)
            .ok_or_else(|| AppError::Unavailable("Camera permission was not granted".to_string()))?;
        let live = |source| stream.track_by_source(source).is_some_and(MediaTrack::is_live);
        if !live(TrackSource::Camera) || !live(TrackSource::Microphone) {
            return Err(AppError::Unavailable(
                "Camera and microphone must both be available".to_string(),
            ));
        }
        Ok(stream)
    }

    async fn open_screen(&self) -> Result<MediaStream, AppError> {
        let stream = self
            .stream(StreamKind::Screen)
            .ok_or_else(|| AppError::Unavailable("Screen sharing was not granted".to_string()))?;
        if !stream
            .track_by_source(TrackSource::Screen)
            .is_some_and(MediaTrack::is_live)
        {
            return Err(AppError::Unavailable("Screen share has already ended".to_string()));
        }
        Ok(stream)
    }
}

impl FrameSource for BrowserBridge {
    fn latest_frame(&self) -> Option<Frame> {
        self.state().frame.as_ref()?.fresh(self.max_age)
    }
}

/// Detection runs in the page; this side replays its latest fresh report.
#[async_trait]
impl FaceDetector for BrowserBridge {
    fn is_ready(&self) -> bool {
        self.state()
            .faces
            .as_ref()
            .is_some_and(|faces| faces.fresh(self.max_age).is_some())
    }

    async fn detect_faces(&self, _frame: &Frame, _sensitivity: f32) -> Result<Vec<FaceDetection>, AppError> {
        self.state()
            .faces
            .as_ref()
            .and_then(|faces| faces.fresh(self.max_age))
            .ok_or_else(|| AppError::Unavailable("Face model is not reporting".to_string()))
    }
}
