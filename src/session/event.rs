// src/session/event.rs

use tokio::sync::oneshot;

use crate::{
    error::AppError,
    models::{
        activity::ActivityKind,
        answer::TestCaseResult,
        media::StreamKind,
        payload::SubmitReceipt,
    },
    session::{device::DeviceFault, presence::PresenceReading},
};

pub type Reply<T> = oneshot::Sender<Result<T, AppError>>;

/// Everything the session controller reacts to, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    // Commands from the UI.
    Start(Reply<()>),
    SelectAnswer {
        index: usize,
        option: usize,
        reply: Reply<()>,
    },
    UpdateCode {
        index: usize,
        code: String,
        language: String,
        reply: Reply<()>,
    },
    RecordRun {
        index: usize,
        passed: bool,
        test_results: Vec<TestCaseResult>,
        reply: Reply<()>,
    },
    ToggleMark {
        index: usize,
        reply: Reply<bool>,
    },
    GoTo {
        index: usize,
        reply: Reply<()>,
    },
    SaveAndNext(Reply<usize>),
    Submit(Reply<SubmitReceipt>),

    // Clock.
    Tick(u64),
    TimeUp,

    // Browser listeners.
    Visibility {
        hidden: bool,
    },
    Fullscreen {
        active: bool,
    },
    /// A held-back focus restore is due.
    FocusSettle,
    BlockedInput {
        kind: ActivityKind,
        detail: Option<String>,
    },
    ScreenShareEnded,
    Chunk {
        stream: StreamKind,
        data: Vec<u8>,
    },

    // Pollers.
    DeviceCheck(Option<DeviceFault>),
    Presence(PresenceReading),

    // Autosave.
    AutosaveTick,
    AutosaveDone {
        mark: SaveMark,
        result: Result<(), AppError>,
    },
}

/// How much of the session state a completed autosave covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveMark {
    pub revision: u64,
    pub activity_len: usize,
}

impl SaveMark {
    pub fn covers(&self, other: &SaveMark) -> bool {
        self.revision >= other.revision && self.activity_len >= other.activity_len
    }

    pub fn merge(&mut self, other: SaveMark) {
        self.revision = self.revision.max(other.revision);
        self.activity_len = self.activity_len.max(other.activity_len);
    }
}
