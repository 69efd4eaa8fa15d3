// src/session/mod.rs

//! The proctored exam session engine.

pub mod answers;
pub mod clock;
pub mod controller;
pub mod device;
pub mod event;
pub mod focus;
pub mod handle;
pub mod media;
pub mod presence;
pub mod recording;
pub mod snapshot;
pub mod violation;

pub use handle::SessionHandle;
pub use snapshot::{SessionSnapshot, SessionStatus};
