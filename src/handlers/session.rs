// src/handlers/session.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::request::{
        QuestionIndexRequest, RunResultRequest, SelectAnswerRequest, UpdateCodeRequest,
    },
    session::SessionHandle,
};

/// Returns the current session snapshot.
pub async fn get_session(State(session): State<SessionHandle>) -> impl IntoResponse {
    Json(session.snapshot())
}

/// Loads the exam, resumes or starts the attempt and acquires media.
///
/// Fails with 503 when a required device is missing and with 409 when the
/// attempt was already submitted.
pub async fn start_session(
    State(session): State<SessionHandle>,
) -> Result<impl IntoResponse, AppError> {
    session.start().await?;
    Ok(Json(session.snapshot()))
}

pub async fn select_answer(
    State(session): State<SessionHandle>,
    Json(payload): Json<SelectAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    session.select_answer(payload.index, payload.option).await?;
    Ok(Json(session.snapshot()))
}

pub async fn update_code(
    State(session): State<SessionHandle>,
    Json(payload): Json<UpdateCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    session
        .update_code(payload.index, payload.code, payload.language)
        .await?;
    Ok(Json(json!({ "saved": true })))
}

/// Records the outcome of a judge run for a coding question.
pub async fn record_run(
    State(session): State<SessionHandle>,
    Json(payload): Json<RunResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    session
        .record_run(payload.index, payload.passed, payload.test_results)
        .await?;
    Ok(Json(json!({ "saved": true })))
}

pub async fn toggle_mark(
    State(session): State<SessionHandle>,
    Json(payload): Json<QuestionIndexRequest>,
) -> Result<impl IntoResponse, AppError> {
    let marked = session.toggle_mark(payload.index).await?;
    Ok(Json(json!({ "index": payload.index, "marked": marked })))
}

pub async fn navigate(
    State(session): State<SessionHandle>,
    Json(payload): Json<QuestionIndexRequest>,
) -> Result<impl IntoResponse, AppError> {
    session.go_to(payload.index).await?;
    Ok(Json(json!({ "current_question_index": payload.index })))
}

/// Saves answers, then advances to the next question.
pub async fn save_and_next(
    State(session): State<SessionHandle>,
) -> Result<impl IntoResponse, AppError> {
    let index = session.save_and_next().await?;
    Ok(Json(json!({ "current_question_index": index })))
}

/// Manual submission. Repeating it after success returns the same receipt.
pub async fn submit(State(session): State<SessionHandle>) -> Result<impl IntoResponse, AppError> {
    let receipt = session.submit().await?;
    Ok(Json(receipt))
}
