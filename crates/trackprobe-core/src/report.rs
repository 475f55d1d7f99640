//! Scenario outcomes and the aggregate suite report.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RunError;
use crate::step::Step;

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed {
        /// Position of the failing step.
        step_index: usize,
        step: Step,
        error: String,
        #[serde(skip)]
        cause: RunError,
    },
}

/// Result of running one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub label: String,
    #[serde(flatten)]
    pub status: ScenarioStatus,
    /// Steps that ran, including a failing one.
    pub steps_executed: usize,
    pub elapsed_ms: u64,
    /// Set when the entry's recovery steps failed after the scenario.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_error: Option<String>,
}

impl ScenarioOutcome {
    pub fn passed(label: impl Into<String>, steps_executed: usize, elapsed_ms: u64) -> Self {
        Self {
            label: label.into(),
            status: ScenarioStatus::Passed,
            steps_executed,
            elapsed_ms,
            recovery_error: None,
        }
    }

    pub fn failed(label: impl Into<String>, step_index: usize, step: Step, cause: RunError, elapsed_ms: u64) -> Self {
        Self {
            label: label.into(),
            status: ScenarioStatus::Failed {
                step_index,
                step,
                error: cause.to_string(),
                cause,
            },
            steps_executed: step_index + 1,
            elapsed_ms,
            recovery_error: None,
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self.status, ScenarioStatus::Passed)
    }

    /// The error that failed the scenario, if any.
    pub fn error(&self) -> Option<&RunError> {
        match &self.status {
            ScenarioStatus::Passed => None,
            ScenarioStatus::Failed { cause, .. } => Some(cause),
        }
    }
}

/// Aggregate result of a suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// Device name the run targeted.
    pub device: String,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<ScenarioOutcome>,
    /// Set when releasing the session failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

impl SuiteReport {
    pub fn new(device: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            device: device.into(),
            session_id,
            started_at: Utc::now(),
            outcomes: Vec::new(),
            teardown_error: None,
        }
    }

    pub fn push(&mut self, outcome: ScenarioOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// Entries whose recovery steps failed, whatever their scenario status.
    pub fn recovery_failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.recovery_error.is_some()).count()
    }

    /// Process exit code: 0 when every scenario passed and every recovery
    /// succeeded, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.all_passed() && self.recovery_failures() == 0 {
            0
        } else {
            1
        }
    }

    /// Final count line, e.g. `5 passed, 1 failed`.
    pub fn summary(&self) -> String {
        let mut line = format!("{} passed, {} failed", self.passed(), self.failed());
        let recovery = self.recovery_failures();
        if recovery > 0 {
            let _ = write!(line, ", {} recovery failed", recovery);
        }
        line
    }

    /// Human-readable summary, one line per scenario.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            match &outcome.status {
                ScenarioStatus::Passed => {
                    let _ = writeln!(out, "PASS  {} ({} steps, {}ms)", outcome.label, outcome.steps_executed, outcome.elapsed_ms);
                }
                ScenarioStatus::Failed { step_index, step, error, .. } => {
                    let _ = writeln!(out, "FAIL  {} at step {} ({}): {}", outcome.label, step_index + 1, step, error);
                }
            }
            if let Some(err) = &outcome.recovery_error {
                let _ = writeln!(out, "      recovery: {}", err);
            }
        }
        if let Some(err) = &self.teardown_error {
            let _ = writeln!(out, "teardown: {}", err);
        }
        out.push_str(&self.summary());
        out
    }
}
