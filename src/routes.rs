// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{recording, sensors, session},
    state::AppState,
};

/// Recorder chunks are sent every few seconds and can be large.
const MAX_CHUNK_BYTES: usize = 16 * 1024 * 1024;

/// Assembles the main application router.
///
/// * `/api/session` drives the exam: start, answers, navigation, submit.
/// * `/api/sensors` receives browser listener events and sensor data.
/// * `/api/recording` receives encoded recorder chunks.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let session_routes = Router::new()
        .route("/", get(session::get_session))
        .route("/start", post(session::start_session))
        .route("/answers", post(session::select_answer))
        .route("/code", post(session::update_code))
        .route("/code/result", post(session::record_run))
        .route("/marks", post(session::toggle_mark))
        .route("/navigate", post(session::navigate))
        .route("/next", post(session::save_and_next))
        .route("/submit", post(session::submit));

    let sensor_routes = Router::new()
        .route("/visibility", post(sensors::visibility))
        .route("/fullscreen", post(sensors::fullscreen))
        .route("/input", post(sensors::blocked_input))
        .route("/devices", post(sensors::announce_stream))
        .route("/tracks/{id}", put(sensors::update_track))
        .route("/frame", post(sensors::frame))
        .route("/faces", post(sensors::faces));

    let recording_routes = Router::new()
        .route("/{stream}", post(recording::push_chunk))
        .layer(DefaultBodyLimit::max(MAX_CHUNK_BYTES));

    Router::new()
        .nest("/api/session", session_routes)
        .nest("/api/sensors", sensor_routes)
        .nest("/api/recording", recording_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
