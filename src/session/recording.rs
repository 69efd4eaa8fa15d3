// src/session/recording.rs

//! Webcam and screen capture: acquisition, audio mixing and chunk buffering.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    error::AppError,
    models::{exam::ProctoringConfig, media::StreamKind},
    services::MediaDevices,
    session::{
        device::WatchedTracks,
        media::{MediaStream, MediaTrack, TrackSource, TrackStatus},
    },
};

/// Append-only chunk list for one stream, consumed once.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    bytes: usize,
}

impl ChunkBuffer {
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.bytes += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Concatenates all chunks in arrival order and empties the buffer.
    pub fn take_blob(&mut self) -> Option<Vec<u8>> {
        if self.chunks.is_empty() {
            return None;
        }
        let mut blob = Vec::with_capacity(self.bytes);
        for chunk in self.chunks.drain(..) {
            blob.extend_from_slice(&chunk);
        }
        self.bytes = 0;
        Some(blob)
    }
}

/// Several audio sources routed into one destination track.
#[derive(Debug)]
pub struct AudioMixer {
    sources: Vec<MediaTrack>,
    output: MediaTrack,
}

impl AudioMixer {
    pub fn output(&self) -> &MediaTrack {
        &self.output
    }

    pub fn sources(&self) -> &[MediaTrack] {
        &self.sources
    }

    /// The destination stays live while any source is.
    pub fn is_live(&self) -> bool {
        self.output.is_live() && self.sources.iter().any(MediaTrack::is_live)
    }

    /// Disconnects the graph. The sources belong to their streams.
    pub fn close(&self) {
        self.output.stop();
    }
}

/// The audio leg of a recorder.
#[derive(Debug)]
pub enum AudioRoute {
    Direct(MediaTrack),
    Mixed(AudioMixer),
}

impl AudioRoute {
    /// No route for no sources, a direct route for one, a mixer for more.
    pub fn connect(name: &str, mut sources: Vec<MediaTrack>) -> Option<Self> {
        match sources.len() {
            0 => None,
            1 => sources.pop().map(AudioRoute::Direct),
            _ => Some(AudioRoute::Mixed(AudioMixer {
                sources,
                output: MediaTrack::new(format!("{}-mix", name), TrackSource::Mix),
            })),
        }
    }

    pub fn track(&self) -> &MediaTrack {
        match self {
            AudioRoute::Direct(track) => track,
            AudioRoute::Mixed(mixer) => mixer.output(),
        }
    }
}

#[derive(Debug)]
struct Recorder {
    video: MediaTrack,
    audio: Option<AudioRoute>,
    buffer: ChunkBuffer,
    active: bool,
}

impl Recorder {
    fn new(kind: StreamKind, video: MediaTrack, audio_sources: Vec<MediaTrack>) -> Self {
        let audio = AudioRoute::connect(kind.as_str(), audio_sources);
        tracing::info!(
            stream = kind.as_str(),
            video = video.id(),
            audio = audio.as_ref().map(|a| a.track().id()),
            "Recorder started"
        );
        Self {
            video,
            audio,
            buffer: ChunkBuffer::default(),
            active: true,
        }
    }

    fn stop(&mut self) -> Option<Vec<u8>> {
        if !self.active {
            return None;
        }
        self.active = false;
        if let Some(AudioRoute::Mixed(mixer)) = &self.audio {
            mixer.close();
        }
        self.buffer.take_blob()
    }
}

/// Blobs produced by stopping the recorders.
#[derive(Debug, Default, PartialEq)]
pub struct RecordingBlobs {
    pub webcam: Option<Vec<u8>>,
    pub screen: Option<Vec<u8>>,
}

impl RecordingBlobs {
    pub fn is_empty(&self) -> bool {
        self.webcam.is_none() && self.screen.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RecordingFlags {
    pub webcam: bool,
    pub screen: bool,
}

/// Sole owner of the session's media streams.
#[derive(Debug, Default)]
pub struct RecordingManager {
    camera: Option<MediaStream>,
    screen: Option<MediaStream>,
    recorders: BTreeMap<StreamKind, Recorder>,
}

impl RecordingManager {
    /// Acquires the streams the exam needs. Required devices that are missing
    /// fail with `Unavailable`; an optional camera is used when offered.
    pub async fn acquire(
        devices: &dyn MediaDevices,
        proctoring: &ProctoringConfig,
    ) -> Result<Self, AppError> {
        let camera = if proctoring.camera_required {
            let stream = devices.open_camera().await?;
            if stream.video_track().is_none() || stream.track_by_source(TrackSource::Microphone).is_none() {
                return Err(AppError::Unavailable(
                    "Camera and microphone access is required".to_string(),
                ));
            }
            Some(stream)
        } else {
            devices.open_camera().await.ok()
        };

        let screen = if proctoring.screen_required {
            let stream = match devices.open_screen().await {
                Ok(stream) if stream.track_by_source(TrackSource::Screen).is_some() => stream,
                other => {
                    // Give the camera back before failing entry.
                    if let Some(camera) = &camera {
                        camera.stop_all();
                    }
                    if let Ok(stream) = &other {
                        stream.stop_all();
                    }
                    return Err(other.err().unwrap_or_else(|| {
                        AppError::Unavailable("Screen sharing is required".to_string())
                    }));
                }
            };
            Some(stream)
        } else {
            None
        };

        Ok(Self::from_streams(camera, screen))
    }

    pub fn from_streams(camera: Option<MediaStream>, screen: Option<MediaStream>) -> Self {
        let mut recorders = BTreeMap::new();
        let microphone = camera
            .as_ref()
            .and_then(|s| s.track_by_source(TrackSource::Microphone))
            .cloned();

        if let Some(video) = camera.as_ref().and_then(|s| s.video_track()).cloned() {
            let audio: Vec<MediaTrack> = microphone.iter().cloned().collect();
            recorders.insert(StreamKind::Webcam, Recorder::new(StreamKind::Webcam, video, audio));
        }

        if let Some(stream) = screen.as_ref() {
            if let Some(video) = stream.track_by_source(TrackSource::Screen).cloned() {
                // System audio and the microphone share one recorded track.
                let mut audio: Vec<MediaTrack> = stream
                    .audio_tracks()
                    .filter(|t| t.source() == TrackSource::SystemAudio)
                    .cloned()
                    .collect();
                audio.extend(microphone.iter().cloned());
                recorders.insert(StreamKind::Screen, Recorder::new(StreamKind::Screen, video, audio));
            }
        }

        Self {
            camera,
            screen,
            recorders,
        }
    }

    /// Returns false when no active recorder takes the chunk.
    pub fn push_chunk(&mut self, kind: StreamKind, chunk: Vec<u8>) -> bool {
        match self.recorders.get_mut(&kind) {
            Some(recorder) if recorder.active => {
                recorder.buffer.push(chunk);
                true
            }
            _ => false,
        }
    }

    pub fn is_recording(&self, kind: StreamKind) -> bool {
        self.recorders
            .get(&kind)
            .is_some_and(|r| r.active && r.video.is_live())
    }

    pub fn flags(&self) -> RecordingFlags {
        RecordingFlags {
            webcam: self.is_recording(StreamKind::Webcam),
            screen: self.is_recording(StreamKind::Screen),
        }
    }

    pub fn watched_tracks(&self) -> WatchedTracks {
        WatchedTracks {
            camera: self.camera.as_ref().and_then(|s| s.video_track()).cloned(),
            microphone: self
                .camera
                .as_ref()
                .and_then(|s| s.track_by_source(TrackSource::Microphone))
                .cloned(),
            screen: self
                .screen
                .as_ref()
                .and_then(|s| s.track_by_source(TrackSource::Screen))
                .cloned(),
        }
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    pub fn track_statuses(&self) -> Vec<TrackStatus> {
        self.camera
            .iter()
            .chain(self.screen.iter())
            .flat_map(|s| s.tracks())
            .map(MediaTrack::status)
            .collect()
    }

    /// Stops every recorder and hands back its blob. Later calls return nothing.
    pub fn stop(&mut self) -> RecordingBlobs {
        let mut blobs = RecordingBlobs::default();
        for (kind, recorder) in self.recorders.iter_mut() {
            let blob = recorder.stop();
            if let Some(data) = &blob {
                tracing::info!(stream = kind.as_str(), bytes = data.len(), "Recorder stopped");
            }
            match kind {
                StreamKind::Webcam => blobs.webcam = blob,
                StreamKind::Screen => blobs.screen = blob,
            }
        }
        blobs
    }

    /// Ends every captured track. Safe to call more than once.
    pub fn release(&mut self) {
        for recorder in self.recorders.values_mut() {
            recorder.active = false;
            if let Some(AudioRoute::Mixed(mixer)) = &recorder.audio {
                mixer.close();
            }
        }
        for stream in self.camera.iter().chain(self.screen.iter()) {
            stream.stop_all();
        }
    }
}

impl Drop for RecordingManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> MediaStream {
        MediaStream::new(vec![
            MediaTrack::new("cam", TrackSource::Camera),
            MediaTrack::new("mic", TrackSource::Microphone),
        ])
    }

    fn screen(with_audio: bool) -> MediaStream {
        let mut tracks = vec![MediaTrack::new("screen", TrackSource::Screen)];
        if with_audio {
            tracks.push(MediaTrack::new("system", TrackSource::SystemAudio));
        }
        MediaStream::new(tracks)
    }

    #[test]
    fn test_chunk_buffer_concatenates_in_order() {
        let mut buffer = ChunkBuffer::default();
        buffer.push(vec![1, 2]);
        buffer.push(vec![]);
        buffer.push(vec![3]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.bytes(), 3);
        assert_eq!(buffer.take_blob(), Some(vec![1, 2, 3]));
        assert_eq!(buffer.take_blob(), None);
    }

    #[test]
    fn test_audio_route_shapes() {
        assert!(AudioRoute::connect("x", vec![]).is_none());

        let direct = AudioRoute::connect("x", vec![MediaTrack::new("mic", TrackSource::Microphone)]);
        assert!(matches!(direct, Some(AudioRoute::Direct(_))));

        let mixed = AudioRoute::connect(
            "screen",
            vec![
                MediaTrack::new("system", TrackSource::SystemAudio),
                MediaTrack::new("mic", TrackSource::Microphone),
            ],
        )
        .unwrap();
        assert_eq!(mixed.track().source(), TrackSource::Mix);
        assert_eq!(mixed.track().id(), "screen-mix");
    }

    #[test]
    fn test_mixer_lives_while_any_source_does() {
        let system = MediaTrack::new("system", TrackSource::SystemAudio);
        let mic = MediaTrack::new("mic", TrackSource::Microphone);
        let Some(AudioRoute::Mixed(mixer)) =
            AudioRoute::connect("screen", vec![system.clone(), mic.clone()])
        else {
            panic!("expected a mixer");
        };

        system.stop();
        assert!(mixer.is_live());
        mic.stop();
        assert!(!mixer.is_live());
        assert_eq!(mixer.sources().len(), 2);
    }

    #[test]
    fn test_screen_recorder_mixes_system_audio_and_mic() {
        let manager = RecordingManager::from_streams(Some(camera()), Some(screen(true)));
        let recorder = &manager.recorders[&StreamKind::Screen];
        assert!(matches!(recorder.audio, Some(AudioRoute::Mixed(_))));

        let webcam = &manager.recorders[&StreamKind::Webcam];
        assert!(matches!(webcam.audio, Some(AudioRoute::Direct(_))));
    }

    #[test]
    fn test_stop_yields_each_blob_once() {
        let mut manager = RecordingManager::from_streams(Some(camera()), Some(screen(false)));
        assert!(manager.push_chunk(StreamKind::Webcam, vec![1, 2]));
        assert!(manager.push_chunk(StreamKind::Screen, vec![9]));
        assert!(manager.push_chunk(StreamKind::Webcam, vec![3]));

        let blobs = manager.stop();
        assert_eq!(blobs.webcam, Some(vec![1, 2, 3]));
        assert_eq!(blobs.screen, Some(vec![9]));

        assert!(!manager.push_chunk(StreamKind::Webcam, vec![4]));
        assert!(manager.stop().is_empty());
    }

    #[test]
    fn test_release_ends_all_tracks() {
        let cam = camera();
        let observer = cam.tracks().to_vec();
        let mut manager = RecordingManager::from_streams(Some(cam), None);
        assert!(manager.flags().webcam);

        manager.release();
        assert!(observer.iter().all(|t| !t.is_live()));
        assert!(!manager.flags().webcam);
    }

    #[test]
    fn test_no_screen_recorder_without_stream() {
        let mut manager = RecordingManager::from_streams(Some(camera()), None);
        assert!(!manager.push_chunk(StreamKind::Screen, vec![1]));
        assert_eq!(manager.flags(), RecordingFlags { webcam: true, screen: false });
    }
}
