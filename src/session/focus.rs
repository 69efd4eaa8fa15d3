// src/session/focus.rs

//! Tab visibility and fullscreen tracking for the shared focus-loss counter.

use std::time::Duration;

use tokio::time::Instant;

use crate::models::activity::ActivityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusSignal {
    Visibility { hidden: bool },
    Fullscreen { active: bool },
}

/// How a signal changed the focus-loss condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEdge {
    None,
    /// Condition went true; feed the counter.
    Lost(ActivityKind),
    /// Condition went false inside the debounce window. The latch stays set;
    /// call [`FocusMonitor::settle`] once the delay has passed.
    Settling(Duration),
    /// Condition went false; release the latch.
    Restored,
}

/// Focus is lost while the tab is hidden or after fullscreen was exited.
/// A fullscreen loss lasts until fullscreen is re-entered, or until the tab is
/// visible again when the exam does not require fullscreen.
///
/// A loss that ends within the debounce window of its start is only released
/// after the window closes, so a quick re-hide continues the same episode.
#[derive(Debug)]
pub struct FocusMonitor {
    fullscreen_required: bool,
    debounce: Duration,
    hidden: bool,
    fullscreen: bool,
    fullscreen_lost: bool,
    last_loss: Option<Instant>,
    /// Deadline of a held-back restore.
    restore_pending: Option<Instant>,
}

impl FocusMonitor {
    pub fn new(fullscreen_required: bool, debounce: Duration) -> Self {
        Self {
            fullscreen_required,
            debounce,
            hidden: false,
            fullscreen: false,
            fullscreen_lost: false,
            last_loss: None,
            restore_pending: None,
        }
    }

    pub fn apply(&mut self, signal: FocusSignal, now: Instant) -> FocusEdge {
        let was_lost = self.is_lost();

        let cause = match signal {
            FocusSignal::Visibility { hidden } => {
                self.hidden = hidden;
                if !hidden && !self.fullscreen_required {
                    self.fullscreen_lost = false;
                }
                ActivityKind::TabSwitch
            }
            FocusSignal::Fullscreen { active } => {
                if self.fullscreen && !active {
                    self.fullscreen_lost = true;
                }
                if active {
                    self.fullscreen_lost = false;
                }
                self.fullscreen = active;
                ActivityKind::FullscreenExit
            }
        };

        match (was_lost, self.is_lost()) {
            (false, true) => {
                if self.restore_pending.take().is_some() {
                    return FocusEdge::None;
                }
                self.last_loss = Some(now);
                FocusEdge::Lost(cause)
            }
            (true, false) => {
                let deadline = self.last_loss.map(|at| at + self.debounce);
                match deadline {
                    Some(deadline) if now < deadline => {
                        self.restore_pending = Some(deadline);
                        FocusEdge::Settling(deadline - now)
                    }
                    _ => FocusEdge::Restored,
                }
            }
            _ => FocusEdge::None,
        }
    }

    /// Releases a held-back restore once its window has closed.
    pub fn settle(&mut self, now: Instant) -> FocusEdge {
        match self.restore_pending {
            Some(deadline) if now >= deadline => {
                self.restore_pending = None;
                FocusEdge::Restored
            }
            _ => FocusEdge::None,
        }
    }

    /// Fullscreen state seen before the exam loaded is kept.
    pub fn set_fullscreen_required(&mut self, required: bool) {
        self.fullscreen_required = required;
    }

    pub fn is_lost(&self) -> bool {
        self.hidden || self.fullscreen_lost
    }

    pub fn is_full_screen(&self) -> bool {
        self.fullscreen
    }

    /// The blocking "return to fullscreen" overlay.
    pub fn needs_fullscreen(&self) -> bool {
        self.fullscreen_required && !self.fullscreen
    }
}
