// src/handlers/sensors.rs

//! Browser listeners and sensors reporting into the session.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        media::{FaceDetection, Frame},
        request::{
            BlockedInputRequest, FrameQuery, FullscreenRequest, StreamAnnouncementRequest,
            VisibilityRequest,
        },
    },
    services::bridge::{BrowserBridge, TrackUpdate},
    session::{SessionHandle, media::TrackSource},
};

pub async fn visibility(
    State(session): State<SessionHandle>,
    Json(payload): Json<VisibilityRequest>,
) -> impl IntoResponse {
    session.visibility_changed(payload.hidden);
    StatusCode::ACCEPTED
}

pub async fn fullscreen(
    State(session): State<SessionHandle>,
    Json(payload): Json<FullscreenRequest>,
) -> impl IntoResponse {
    session.fullscreen_changed(payload.active);
    StatusCode::ACCEPTED
}

/// Logs an intercepted copy, cut, paste or context-menu action.
pub async fn blocked_input(
    State(session): State<SessionHandle>,
    Json(payload): Json<BlockedInputRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    session.blocked_input(payload.kind.into(), payload.detail);
    Ok(StatusCode::ACCEPTED)
}

/// Registers the tracks of a stream the candidate granted.
pub async fn announce_stream(
    State(bridge): State<BrowserBridge>,
    Json(payload): Json<StreamAnnouncementRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    bridge.announce_stream(payload.stream, payload.tracks)?;
    Ok(StatusCode::CREATED)
}

/// Mirrors a track's `enabled`, `muted` and `ended` state.
pub async fn update_track(
    State(bridge): State<BrowserBridge>,
    State(session): State<SessionHandle>,
    Path(id): Path<String>,
    Json(payload): Json<TrackUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let ended = payload.ended;
    bridge.update_track(&id, payload)?;

    if ended
        && bridge
            .track(&id)
            .is_some_and(|t| t.source() == TrackSource::Screen)
    {
        session.screen_share_ended();
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Accepts a downsampled RGBA8 preview frame.
pub async fn frame(
    State(bridge): State<BrowserBridge>,
    Query(size): Query<FrameQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let frame = Frame::new(size.width, size.height, body.to_vec()).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Expected {}x{} RGBA pixels",
            size.width, size.height
        ))
    })?;
    bridge.set_frame(frame);
    Ok(StatusCode::NO_CONTENT)
}

/// Latest output of the in-page face-landmark model.
pub async fn faces(
    State(bridge): State<BrowserBridge>,
    Json(payload): Json<Vec<FaceDetection>>,
) -> Result<impl IntoResponse, AppError> {
    for face in &payload {
        if let Err(validation_errors) = face.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
    }

    bridge.report_faces(payload);
    Ok(StatusCode::NO_CONTENT)
}
