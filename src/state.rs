// src/state.rs

use axum::extract::FromRef;

use crate::{services::bridge::BrowserBridge, session::SessionHandle};

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub bridge: BrowserBridge,
}

impl FromRef<AppState> for SessionHandle {
    fn from_ref(state: &AppState) -> Self {
        state.session.clone()
    }
}

impl FromRef<AppState> for BrowserBridge {
    fn from_ref(state: &AppState) -> Self {
        state.bridge.clone()
    }
}
