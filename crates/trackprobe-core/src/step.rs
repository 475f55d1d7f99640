//! Scenario steps and step log entries.
//!
//! A [`Scenario`] is a label plus an ordered list of [`Step`]s. Steps are plain
//! data: they serialize as JSON with a `type` tag, so catalogs can be stored in
//! files and every executed step can be journaled as-is.
//!
//! # Step Types
//!
//! - **Element interaction**: [`Step::Locate`], [`Step::TapLocated`], [`Step::Tap`], [`Step::ScrollTo`]
//! - **Navigation**: [`Step::Back`], [`Step::StartActivity`]
//! - **Lifecycle**: [`Step::Background`], [`Step::Restart`]
//! - **Timing**: [`Step::Wait`]
//! - **Assertions**: [`Step::AssertText`]
//!
//! # Example
//!
//! ```
//! use trackprobe_core::step::{Scenario, Step, StepLog, StepResult};
//!
//! let scenario = Scenario::new("trigger sync")
//!     .step(Step::locate("Trigger Synchronize"))
//!     .step(Step::TapLocated)
//!     .step(Step::Back);
//!
//! let log = StepLog::new(&scenario.label, 0, scenario.steps[0].clone(), StepResult::Success, 12);
//! println!("{} {}", log.id, log.step.name());
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Check applied to text read by [`Step::AssertText`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TextCheck {
    /// At least one ASCII digit.
    ContainsDigit,
    /// Contains the given substring.
    Contains(String),
    /// Not empty after trimming.
    NotEmpty,
}

impl TextCheck {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextCheck::ContainsDigit => text.chars().any(|c| c.is_ascii_digit()),
            TextCheck::Contains(needle) => text.contains(needle.as_str()),
            TextCheck::NotEmpty => !text.trim().is_empty(),
        }
    }
}

impl fmt::Display for TextCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextCheck::ContainsDigit => write!(f, "contains a digit"),
            TextCheck::Contains(needle) => write!(f, "contains '{}'", needle),
            TextCheck::NotEmpty => write!(f, "is not empty"),
        }
    }
}

/// One scripted UI action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Find the element with this visible text and remember it for
    /// [`Step::TapLocated`].
    Locate {
        text: String,
    },

    /// Tap the element remembered by the last [`Step::Locate`] or
    /// [`Step::ScrollTo`].
    TapLocated,

    /// Find the element with this visible text and tap it.
    Tap {
        text: String,
    },

    /// Scroll until an element with this text is visible and remember it.
    ScrollTo {
        text: String,
    },

    /// Platform back action.
    Back,

    /// Pause the scenario.
    Wait {
        millis: u64,
    },

    /// Send the app to the background and bring it back after `seconds`.
    Background {
        seconds: u64,
    },

    /// Kill the app and launch it again in the same session.
    Restart,

    /// Read the text of the first element matching `xpath` and check it.
    AssertText {
        xpath: String,
        check: TextCheck,
    },

    /// Start an activity explicitly.
    StartActivity {
        package: String,
        activity: String,
    },
}

impl Step {
    pub fn locate(text: impl Into<String>) -> Self {
        Step::Locate { text: text.into() }
    }

    pub fn tap(text: impl Into<String>) -> Self {
        Step::Tap { text: text.into() }
    }

    pub fn scroll_to(text: impl Into<String>) -> Self {
        Step::ScrollTo { text: text.into() }
    }

    pub fn wait(duration: Duration) -> Self {
        Step::Wait {
            millis: duration.as_millis() as u64,
        }
    }

    pub fn background(duration: Duration) -> Self {
        Step::Background {
            seconds: duration.as_secs(),
        }
    }

    /// Returns a short, static name for this step suitable for tracing span
    /// metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Locate { .. } => "locate",
            Step::TapLocated => "tap_located",
            Step::Tap { .. } => "tap",
            Step::ScrollTo { .. } => "scroll_to",
            Step::Back => "back",
            Step::Wait { .. } => "wait",
            Step::Background { .. } => "background",
            Step::Restart => "restart",
            Step::AssertText { .. } => "assert_text",
            Step::StartActivity { .. } => "start_activity",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Locate { text } => write!(f, "locate '{}'", text),
            Step::TapLocated => write!(f, "tap located element"),
            Step::Tap { text } => write!(f, "tap '{}'", text),
            Step::ScrollTo { text } => write!(f, "scroll to '{}'", text),
            Step::Back => write!(f, "back"),
            Step::Wait { millis } => write!(f, "wait {}ms", millis),
            Step::Background { seconds } => write!(f, "background for {}s", seconds),
            Step::Restart => write!(f, "restart app"),
            Step::AssertText { xpath, check } => write!(f, "assert text of {} {}", xpath, check),
            Step::StartActivity { package, activity } => {
                write!(f, "start activity {}/{}", package, activity)
            }
        }
    }
}

/// A labelled, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            steps: Vec::new(),
        }
    }

    /// Appends one step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a sequence of steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }
}

/// The result of executing a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepResult {
    /// The step completed successfully.
    Success,

    /// The step failed with the given error message.
    Failure(String),
}

/// A journaled step with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    /// Unique identifier for this log entry.
    pub id: Uuid,

    /// When the step finished.
    pub timestamp: DateTime<Utc>,

    /// Label of the scenario the step belongs to.
    pub scenario: String,

    /// Position of the step in its scenario.
    pub index: usize,

    pub step: Step,

    pub result: StepResult,

    /// How long the step took in milliseconds.
    pub duration_ms: u64,
}

impl StepLog {
    /// Creates a new log entry with a fresh id and the current time.
    pub fn new(scenario: &str, index: usize, step: Step, result: StepResult, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            scenario: scenario.to_string(),
            index,
            step,
            result,
            duration_ms,
        }
    }
}
