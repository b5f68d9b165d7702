//! Boot stages of a provisioning instance.
//!
//! ```text
//! PendingBoot → LoggingConfigured → TaskExecuting → Signaled ─┬→ Terminating
//!                                                             └→ Idle
//! ```
//!
//! Strictly ordered: no branching except at the end, no re-entry.

use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BootStage {
    PendingBoot,
    LoggingConfigured,
    TaskExecuting,
    Signaled,
    /// Capacity scaled to zero after the log grace period.
    Terminating,
    /// Left running for manual inspection.
    Idle,
}

impl BootStage {
    pub fn next(self, self_terminate: bool) -> Option<BootStage> {
        match self {
            BootStage::PendingBoot => Some(BootStage::LoggingConfigured),
            BootStage::LoggingConfigured => Some(BootStage::TaskExecuting),
            BootStage::TaskExecuting => Some(BootStage::Signaled),
            BootStage::Signaled if self_terminate => Some(BootStage::Terminating),
            BootStage::Signaled => Some(BootStage::Idle),
            BootStage::Terminating | BootStage::Idle => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BootStage::Terminating | BootStage::Idle)
    }

    /// Every stage an instance passes through, in order.
    pub fn sequence(self_terminate: bool) -> Vec<BootStage> {
        let mut stages = vec![BootStage::PendingBoot];
        let mut current = BootStage::PendingBoot;
        while let Some(next) = current.next(self_terminate) {
            stages.push(next);
            current = next;
        }
        stages
    }
}

/// Records the stages reached while rendering, rejecting out-of-order moves.
#[derive(Debug, Clone)]
pub struct StageTrail {
    self_terminate: bool,
    stages: Vec<BootStage>,
}

impl StageTrail {
    pub fn new(self_terminate: bool) -> Self {
        Self {
            self_terminate,
            stages: vec![BootStage::PendingBoot],
        }
    }

    pub fn current(&self) -> BootStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(BootStage::PendingBoot)
    }

    pub fn advance(&mut self, to: BootStage) -> FarmsteadResult<()> {
        let current = self.current();
        if current.next(self.self_terminate) != Some(to) {
            return Err(FarmsteadError::Internal(format!(
                "illegal boot stage transition {:?} -> {:?}",
                current, to
            )));
        }
        tracing::trace!(from = ?current, to = ?to, "Boot stage rendered");
        self.stages.push(to);
        Ok(())
    }

    pub fn into_stages(self) -> Vec<BootStage> {
        self.stages
    }
}
