// src/session/device.rs

//! Device-integrity polling over the recording manager's tracks.

use std::sync::Arc;

use serde::Serialize;
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle, time::interval};

use crate::{
    config::SessionConfig,
    services::FrameSource,
    session::{event::SessionEvent, media::MediaTrack, presence::average_luminance},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFault {
    Disconnected,
    Disabled,
    Muted,
    BlankFrame,
}

impl DeviceFault {
    pub fn describe(self) -> &'static str {
        match self {
            DeviceFault::Disconnected => "Camera or microphone disconnected",
            DeviceFault::Disabled => "Camera or microphone was turned off",
            DeviceFault::Muted => "Camera or microphone is muted",
            DeviceFault::BlankFrame => "Camera view is dark or covered",
        }
    }
}

/// Read handles the poller watches. The streams stay owned by the recorder.
#[derive(Debug, Clone, Default)]
pub struct WatchedTracks {
    pub camera: Option<MediaTrack>,
    pub microphone: Option<MediaTrack>,
    pub screen: Option<MediaTrack>,
}

/// Forces a soft-disabled track back on, then classifies it.
/// A track that had to be re-enabled still reports `Disabled` for this tick.
pub fn inspect_track(track: &MediaTrack) -> Option<DeviceFault> {
    let was_disabled = !track.is_enabled();
    if was_disabled {
        tracing::debug!(track = track.id(), "Re-enabling soft-disabled track");
        track.set_enabled(true);
    }

    if !track.is_live() {
        Some(DeviceFault::Disconnected)
    } else if was_disabled {
        Some(DeviceFault::Disabled)
    } else if track.is_muted() {
        Some(DeviceFault::Muted)
    } else {
        None
    }
}

/// Camera and microphone first, then the frame brightness.
pub fn check_devices(
    tracks: &WatchedTracks,
    frames: &dyn FrameSource,
    darkness_threshold: f32,
) -> Option<DeviceFault> {
    let camera = tracks.camera.as_ref()?;
    // Inspect every track so all of them get re-enabled this tick.
    let faults: Vec<DeviceFault> = [Some(camera), tracks.microphone.as_ref()]
        .into_iter()
        .flatten()
        .filter_map(inspect_track)
        .collect();
    if let Some(&fault) = faults.first() {
        return Some(fault);
    }

    let frame = frames.latest_frame()?;
    if average_luminance(&frame) < darkness_threshold {
        Some(DeviceFault::BlankFrame)
    } else {
        None
    }
}

pub fn spawn_device_poller(
    tracks: WatchedTracks,
    frames: Arc<dyn FrameSource>,
    config: &SessionConfig,
    events: UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    let period = config.poll_interval;
    let darkness_threshold = config.darkness_threshold;

    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut screen = tracks.screen.clone();
        loop {
            ticker.tick().await;

            if tracks.camera.is_some() {
                let fault = check_devices(&tracks, frames.as_ref(), darkness_threshold);
                if events.send(SessionEvent::DeviceCheck(fault)).is_err() {
                    break;
                }
            }

            if screen.as_ref().is_some_and(|track| !track.is_live()) {
                tracing::warn!("Screen share track ended");
                screen = None;
                if events.send(SessionEvent::ScreenShareEnded).is_err() {
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::media::Frame, session::media::TrackSource};
    use std::sync::Mutex;

    struct StaticFrame(Mutex<Option<Frame>>);

    impl FrameSource for StaticFrame {
        fn latest_frame(&self) -> Option<Frame> {
            self.0.lock().unwrap().clone()
        }
    }

    fn frame(value: u8) -> StaticFrame {
        StaticFrame(Mutex::new(Frame::new(4, 4, [value, value, value, 255].repeat(16))))
    }

    fn tracks() -> WatchedTracks {
        WatchedTracks {
            camera: Some(MediaTrack::new("cam", TrackSource::Camera)),
            microphone: Some(MediaTrack::new("mic", TrackSource::Microphone)),
            screen: None,
        }
    }

    #[test]
    fn test_healthy_devices_report_nothing() {
        assert_eq!(check_devices(&tracks(), &frame(200), 40.0), None);
    }

    #[test]
    fn test_disabled_track_is_reenabled_and_reported() {
        let tracks = tracks();
        let mic = tracks.microphone.clone().unwrap();
        mic.set_enabled(false);

        assert_eq!(
            check_devices(&tracks, &frame(200), 40.0),
            Some(DeviceFault::Disabled)
        );
        assert!(mic.is_enabled());
        assert_eq!(check_devices(&tracks, &frame(200), 40.0), None);
    }

    #[test]
    fn test_ended_camera_is_disconnected() {
        let tracks = tracks();
        tracks.camera.as_ref().unwrap().stop();
        assert_eq!(
            check_devices(&tracks, &frame(200), 40.0),
            Some(DeviceFault::Disconnected)
        );
    }

    #[test]
    fn test_muted_and_dark() {
        let tracks = tracks();
        assert_eq!(
            check_devices(&tracks, &frame(5), 40.0),
            Some(DeviceFault::BlankFrame)
        );

        tracks.camera.as_ref().unwrap().set_muted(true);
        assert_eq!(
            check_devices(&tracks, &frame(5), 40.0),
            Some(DeviceFault::Muted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_reports_screen_share_end_once() {
        let screen = MediaTrack::new("screen", TrackSource::Screen);
        let watched = WatchedTracks {
            screen: Some(screen.clone()),
            ..WatchedTracks::default()
        };
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_device_poller(
            watched,
            Arc::new(frame(200)),
            &SessionConfig::default(),
            tx,
        );

        screen.stop();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        handle.abort();

        let mut ended = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SessionEvent::ScreenShareEnded) {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }
}
