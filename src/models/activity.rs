// src/models/activity.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of event an activity log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    TabSwitch,
    FullscreenExit,
    DeviceIntegrity,
    MultipleFaces,
    FaceAbsent,
    HeadTurned,
    ScreenShareStopped,
    Copy,
    Cut,
    Paste,
    ContextMenu,
}

/// Append-only record of a violation or a blocked action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(kind: ActivityKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
