// src/handlers/recording.rs

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{error::AppError, models::media::StreamKind, session::SessionHandle};

/// Appends one encoded recorder chunk to the named stream.
pub async fn push_chunk(
    State(session): State<SessionHandle>,
    Path(stream): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let stream = StreamKind::parse(&stream)
        .ok_or_else(|| AppError::NotFound(format!("Unknown stream '{}'", stream)))?;

    session.push_chunk(stream, body.to_vec());
    Ok(StatusCode::ACCEPTED)
}
