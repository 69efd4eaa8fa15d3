// src/session/violation.rs

//! Latch + threshold counters, one per violation category.

use serde::{Deserialize, Serialize};

use crate::{
    config::{ABSENT_FACE_LIMIT, DEVICE_INTEGRITY_LIMIT, HEAD_TURNED_LIMIT, MULTIPLE_FACES_LIMIT},
    models::exam::ProctoringConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    /// Tab hidden or fullscreen exited. Both feed the same counter.
    FocusLoss,
    DeviceIntegrity,
    MultipleFaces,
    AbsentFace,
    HeadTurned,
}

impl ViolationCategory {
    /// Declaration order; `category as usize` indexes into this.
    pub const ALL: [ViolationCategory; 5] = [
        ViolationCategory::FocusLoss,
        ViolationCategory::DeviceIntegrity,
        ViolationCategory::MultipleFaces,
        ViolationCategory::AbsentFace,
        ViolationCategory::HeadTurned,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ViolationCategory::FocusLoss => "Leaving the exam window",
            ViolationCategory::DeviceIntegrity => "Camera or microphone tampering",
            ViolationCategory::MultipleFaces => "Multiple people detected",
            ViolationCategory::AbsentFace => "No face detected",
            ViolationCategory::HeadTurned => "Looking away from the screen",
        }
    }

    /// Configured limit for this category.
    pub fn limit(self, proctoring: &ProctoringConfig) -> u32 {
        match self {
            ViolationCategory::FocusLoss => proctoring.focus_loss_limit,
            ViolationCategory::DeviceIntegrity => DEVICE_INTEGRITY_LIMIT,
            ViolationCategory::MultipleFaces => MULTIPLE_FACES_LIMIT,
            ViolationCategory::AbsentFace => ABSENT_FACE_LIMIT,
            ViolationCategory::HeadTurned => HEAD_TURNED_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterState {
    Clear,
    Flagged,
    /// Terminal. The counter ignores all further observations.
    Escalated,
}

/// What a single observation did to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Unchanged,
    /// Condition went false; the latch is released.
    Cleared,
    Warned { count: u32, limit: u32 },
    Escalated { count: u32, limit: u32 },
}

#[derive(Debug, Clone)]
pub struct ViolationCounter {
    category: ViolationCategory,
    count: u32,
    limit: u32,
    latched: bool,
    escalated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationStatus {
    pub category: ViolationCategory,
    pub count: u32,
    pub limit: u32,
    pub state: CounterState,
}

impl ViolationCounter {
    pub fn new(category: ViolationCategory, limit: u32) -> Self {
        Self {
            category,
            count: 0,
            limit: limit.max(1),
            latched: false,
            escalated: false,
        }
    }

    /// Feeds the current condition. Counts only on the false -> true edge and
    /// escalates once `count >= limit`.
    pub fn observe(&mut self, condition: bool) -> Observation {
        if self.escalated {
            return Observation::Unchanged;
        }

        match (condition, self.latched) {
            (true, false) => {
                self.latched = true;
                self.count += 1;
                if self.count >= self.limit {
                    self.escalated = true;
                    Observation::Escalated {
                        count: self.count,
                        limit: self.limit,
                    }
                } else {
                    Observation::Warned {
                        count: self.count,
                        limit: self.limit,
                    }
                }
            }
            (false, true) => {
                self.latched = false;
                Observation::Cleared
            }
            _ => Observation::Unchanged,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn state(&self) -> CounterState {
        if self.escalated {
            CounterState::Escalated
        } else if self.latched {
            CounterState::Flagged
        } else {
            CounterState::Clear
        }
    }

    pub fn status(&self) -> ViolationStatus {
        ViolationStatus {
            category: self.category,
            count: self.count,
            limit: self.limit,
            state: self.state(),
        }
    }
}

/// All counters of a session. Lives as long as the attempt.
#[derive(Debug, Clone)]
pub struct ViolationBoard {
    counters: Vec<ViolationCounter>,
}

impl ViolationBoard {
    pub fn new(proctoring: &ProctoringConfig) -> Self {
        let counters = ViolationCategory::ALL
            .iter()
            .map(|&category| ViolationCounter::new(category, category.limit(proctoring)))
            .collect();
        Self { counters }
    }

    pub fn observe(&mut self, category: ViolationCategory, condition: bool) -> Observation {
        self.counter_mut(category).observe(condition)
    }

    pub fn counter(&self, category: ViolationCategory) -> &ViolationCounter {
        &self.counters[category as usize]
    }

    fn counter_mut(&mut self, category: ViolationCategory) -> &mut ViolationCounter {
        &mut self.counters[category as usize]
    }

    pub fn statuses(&self) -> Vec<ViolationStatus> {
        self.counters.iter().map(ViolationCounter::status).collect()
    }
}

impl Default for ViolationBoard {
    fn default() -> Self {
        Self::new(&ProctoringConfig::default())
    }
}
