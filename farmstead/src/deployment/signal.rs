//! Completion signal between a provisioning instance and the controller.
//!
//! The controller blocks on exactly one signal per provisioning instance.
//! Success completes the resource; an explicit failure, a timeout, or a
//! sender that disappears without reporting all fail the deployment. Nothing
//! is retried: a failed instance needs a fresh deployment attempt.

use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use std::time::Duration;
use tokio::sync::oneshot;

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const MAX_EXECUTION_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// What the instance reports when its main sequence ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub exit_code: i32,
    pub reason: Option<String>,
}

impl CompletionReport {
    pub fn from_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Create the sender/receiver pair for one completion signal.
pub fn completion_channel() -> (
    oneshot::Sender<CompletionReport>,
    oneshot::Receiver<CompletionReport>,
) {
    oneshot::channel()
}

/// Where the instance addresses its completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalTarget {
    pub stack: String,
    pub resource: String,
    pub region: String,
}

impl SignalTarget {
    /// Shell command reporting `$exitCode` to the controller.
    ///
    /// A failure to deliver the signal is logged rather than fatal, the
    /// controller then fails the resource on timeout.
    pub fn command(&self, exit_code_var: &str) -> String {
        format!(
            "/opt/aws/bin/cfn-signal --stack {} --resource {} --region {} -e ${} || echo 'Failed to send completion signal'",
            self.stack, self.resource, self.region, exit_code_var
        )
    }
}

/// Readiness contract: `count` signals within `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSignal {
    count: u32,
    timeout: Duration,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self {
            count: 1,
            timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }
}

impl CompletionSignal {
    pub fn new(timeout: Duration) -> FarmsteadResult<Self> {
        if timeout.is_zero() {
            return Err(FarmsteadError::Config(
                "execution timeout must be greater than zero".into(),
            ));
        }
        if timeout > MAX_EXECUTION_TIMEOUT {
            return Err(FarmsteadError::Config(format!(
                "execution timeout {:?} exceeds the maximum of {:?}",
                timeout, MAX_EXECUTION_TIMEOUT
            )));
        }
        Ok(Self { count: 1, timeout })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout as an ISO-8601 duration, e.g. `PT15M` or `PT1H30M5S`.
    pub fn timeout_iso8601(&self) -> String {
        let secs = self.timeout.as_secs();
        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        let mut out = String::from("PT");
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if seconds > 0 || out.len() == 2 {
            out.push_str(&format!("{}S", seconds));
        }
        out
    }

    /// Block until the signal arrives or the timeout elapses.
    pub async fn wait(
        &self,
        receiver: oneshot::Receiver<CompletionReport>,
    ) -> FarmsteadResult<CompletionReport> {
        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(report)) if report.is_success() => {
                tracing::info!("Completion signal received");
                Ok(report)
            }
            Ok(Ok(report)) => {
                tracing::warn!(
                    exit_code = report.exit_code,
                    reason = ?report.reason,
                    "Completion signal reported failure"
                );
                Err(FarmsteadError::BootFailed {
                    exit_code: report.exit_code,
                })
            }
            Ok(Err(_)) => {
                tracing::warn!("Signal sender dropped before reporting");
                Err(FarmsteadError::Timeout(self.timeout))
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Completion signal timed out");
                Err(FarmsteadError::Timeout(self.timeout))
            }
        }
    }
}
