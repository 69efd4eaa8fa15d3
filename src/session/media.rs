// src/session/media.rs

//! Shared handles to live media tracks.
//!
//! A `MediaTrack` is a cheap clone of one underlying track state. The recording
//! manager owns the streams; monitors get clones so they can read liveness and
//! force a soft-disabled track back on.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
    SystemAudio,
    /// Output of the audio mixer.
    Mix,
}

impl TrackSource {
    pub fn is_audio(self) -> bool {
        matches!(
            self,
            TrackSource::Microphone | TrackSource::SystemAudio | TrackSource::Mix
        )
    }
}

#[derive(Debug)]
struct TrackState {
    live: AtomicBool,
    enabled: AtomicBool,
    muted: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: Arc<str>,
    source: TrackSource,
    state: Arc<TrackState>,
}

/// Point-in-time view of a track, published to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStatus {
    pub id: String,
    pub source: TrackSource,
    pub live: bool,
    pub enabled: bool,
    pub muted: bool,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, source: TrackSource) -> Self {
        let id: String = id.into();
        Self {
            id: id.into(),
            source,
            state: Arc::new(TrackState {
                live: AtomicBool::new(true),
                enabled: AtomicBool::new(true),
                muted: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.state.muted.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_muted(&self, muted: bool) {
        self.state.muted.store(muted, Ordering::SeqCst);
    }

    /// Ends the track. Irreversible.
    pub fn stop(&self) {
        self.state.live.store(false, Ordering::SeqCst);
    }

    pub fn status(&self) -> TrackStatus {
        TrackStatus {
            id: self.id.to_string(),
            source: self.source,
            live: self.is_live(),
            enabled: self.is_enabled(),
            muted: self.is_muted(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// First video track (camera or screen).
    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| !t.source().is_audio())
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.source().is_audio())
    }

    pub fn track_by_source(&self, source: TrackSource) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.source() == source)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}
