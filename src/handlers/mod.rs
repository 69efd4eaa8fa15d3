// src/handlers/mod.rs

pub mod recording;
pub mod sensors;
pub mod session;
