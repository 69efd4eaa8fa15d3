// src/session/presence.rs

//! Face presence polling: darkness pre-filter, face count, head orientation.

use std::sync::Arc;

use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle, time::interval};

use crate::{
    config::{HEAD_STRAIGHT_BAND, SAMPLE_HEIGHT, SAMPLE_WIDTH, SessionConfig},
    models::media::{FaceDetection, Frame, Landmarks},
    services::{FaceDetector, FrameSource},
    session::event::SessionEvent,
};

/// Result of one successful detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceReading {
    pub face_count: usize,
    /// Only meaningful when exactly one face is visible.
    pub head_turned: bool,
}

impl PresenceReading {
    pub fn from_detections(faces: &[FaceDetection]) -> Self {
        let head_turned = match faces {
            [only] => only.landmarks.as_ref().is_some_and(is_head_turned),
            _ => false,
        };
        Self {
            face_count: faces.len(),
            head_turned,
        }
    }
}

/// Mean Rec. 601 luma (0-255) over a grid of at most 64x48 samples.
pub fn average_luminance(frame: &Frame) -> f32 {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let step_x = (width / SAMPLE_WIDTH as usize).max(1);
    let step_y = (height / SAMPLE_HEIGHT as usize).max(1);

    let mut sum = 0.0f64;
    let mut samples = 0u64;
    for y in (0..height).step_by(step_y) {
        for x in (0..width).step_by(step_x) {
            let i = (y * width + x) * 4;
            let Some(px) = frame.rgba.get(i..i + 3) else {
                continue;
            };
            sum += 0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2]);
            samples += 1;
        }
    }

    if samples == 0 {
        0.0
    } else {
        (sum / samples as f64) as f32
    }
}

/// Horizontal nose position between the jaw extremes, 0.0 (left) to 1.0 (right).
pub fn nose_to_jaw_ratio(landmarks: &Landmarks) -> Option<f32> {
    let (min_x, max_x) = landmarks
        .jaw
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.x), hi.max(p.x)));
    let width = max_x - min_x;
    if !width.is_finite() || width <= f32::EPSILON {
        return None;
    }
    Some((landmarks.nose.x - min_x) / width)
}

/// A collapsed jaw outline means a profile view, which counts as turned.
pub fn is_head_turned(landmarks: &Landmarks) -> bool {
    let (lo, hi) = HEAD_STRAIGHT_BAND;
    match nose_to_jaw_ratio(landmarks) {
        Some(ratio) => ratio < lo || ratio > hi,
        None => true,
    }
}

/// One poll. `None` when there is nothing to judge: no frame yet, a dark
/// frame (left to the device check), the model not loaded, or a detector error.
pub async fn sample_presence(
    frames: &dyn FrameSource,
    detector: &dyn FaceDetector,
    sensitivity: f32,
    darkness_threshold: f32,
) -> Option<PresenceReading> {
    let frame = frames.latest_frame()?;
    if average_luminance(&frame) < darkness_threshold {
        return None;
    }
    if !detector.is_ready() {
        return None;
    }

    match detector.detect_faces(&frame, sensitivity).await {
        Ok(faces) => Some(PresenceReading::from_detections(&faces)),
        Err(e) => {
            tracing::warn!("Face detection failed: {}", e);
            None
        }
    }
}

pub fn spawn_presence_monitor(
    frames: Arc<dyn FrameSource>,
    detector: Arc<dyn FaceDetector>,
    sensitivity: f32,
    config: &SessionConfig,
    events: UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    let period = config.poll_interval;
    let darkness_threshold = config.darkness_threshold;

    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let reading =
                sample_presence(frames.as_ref(), detector.as_ref(), sensitivity, darkness_threshold)
                    .await;
            if let Some(reading) = reading {
                if events.send(SessionEvent::Presence(reading)).is_err() {
                    break;
                }
            }
        }
    })
}
