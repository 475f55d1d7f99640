//! Sequential scenario execution.
//!
//! [`ScenarioRunner`] executes the steps of one [`Scenario`] against the live
//! session held by a [`DriverHandle`]. Steps run strictly in order and the
//! first failing step ends the scenario; there are no retries. Every executed
//! step is recorded in the [`StepJournal`].
//!
//! [`run_suite`] ties the pieces together for a whole catalog: bootstrap,
//! every entry in order, then teardown, which runs even when entries fail.
//! An entry's recovery steps run after its scenario whatever the outcome, so
//! a crash entry that fails early still restarts the app for the next one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trackprobe_core::config::Profile;
//! use trackprobe_core::element::AmbiguityPolicy;
//! use trackprobe_core::journal::StepJournal;
//! use trackprobe_core::runner::ScenarioRunner;
//! use trackprobe_core::session::{AppiumConnector, DriverHandle};
//! use trackprobe_core::step::{Scenario, Step};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut handle = DriverHandle::bootstrap(&AppiumConnector, &Profile::local_emulator()).await?;
//! let mut runner = ScenarioRunner::new(AmbiguityPolicy::FirstMatch, Arc::new(StepJournal::in_memory()));
//! let scenario = Scenario::new("sync").step(Step::tap("Trigger Synchronize")).step(Step::Back);
//! let outcome = runner.run(&handle, &scenario).await;
//! println!("passed: {}", outcome.is_passed());
//! handle.release().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn, Instrument};

use crate::catalog::Catalog;
use crate::config::Profile;
use crate::driver::DriverError;
use crate::element::{AmbiguityPolicy, Element, Located, Locator};
use crate::error::RunError;
use crate::journal::StepJournal;
use crate::report::{ScenarioOutcome, SuiteReport};
use crate::session::{Connector, DriverHandle};
use crate::step::{Scenario, Step, StepLog, StepResult};

/// Executes scenarios one step at a time.
pub struct ScenarioRunner {
    policy: AmbiguityPolicy,
    journal: Arc<StepJournal>,
    /// Element remembered by the last `Locate` or `ScrollTo`.
    located: Option<Element>,
}

impl ScenarioRunner {
    pub fn new(policy: AmbiguityPolicy, journal: Arc<StepJournal>) -> Self {
        Self {
            policy,
            journal,
            located: None,
        }
    }

    pub fn journal(&self) -> &Arc<StepJournal> {
        &self.journal
    }

    /// Runs every step of `scenario` in order.
    ///
    /// Never returns an error: a failing step is captured in the outcome
    /// together with its index.
    pub async fn run(&mut self, handle: &DriverHandle, scenario: &Scenario) -> ScenarioOutcome {
        let span = info_span!("run_scenario", scenario = %scenario.label);
        async {
            let started = Instant::now();
            self.located = None;

            for (index, step) in scenario.steps.iter().enumerate() {
                if let Err(cause) = self.run_step(handle, &scenario.label, index, step).await {
                    warn!(index, step = %step, error = %cause, "scenario failed");
                    return ScenarioOutcome::failed(
                        scenario.label.clone(),
                        index,
                        step.clone(),
                        cause,
                        started.elapsed().as_millis() as u64,
                    );
                }
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;
            info!(steps = scenario.steps.len(), elapsed_ms, "scenario passed");
            ScenarioOutcome::passed(scenario.label.clone(), scenario.steps.len(), elapsed_ms)
        }
        .instrument(span)
        .await
    }

    /// Runs `steps` after a scenario to bring the app back to a usable state.
    ///
    /// Journal indices continue from `first_index`. Stops at the first failing
    /// step and returns its error.
    pub async fn recover(
        &mut self,
        handle: &DriverHandle,
        label: &str,
        first_index: usize,
        steps: &[Step],
    ) -> Result<(), RunError> {
        let span = info_span!("recover", scenario = %label);
        async {
            for (offset, step) in steps.iter().enumerate() {
                if let Err(e) = self.run_step(handle, label, first_index + offset, step).await {
                    warn!(step = %step, error = %e, "recovery failed");
                    return Err(e);
                }
            }
            debug!(steps = steps.len(), "recovery complete");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Executes one step, then traces and journals its result.
    async fn run_step(&mut self, handle: &DriverHandle, label: &str, index: usize, step: &Step) -> Result<(), RunError> {
        let step_start = Instant::now();
        let result = self.execute_step(handle, step).await;
        let elapsed_ms = step_start.elapsed().as_millis() as u64;
        debug!(index, step = step.name(), elapsed_ms, success = result.is_ok(), "step complete");

        let logged = match &result {
            Ok(()) => StepResult::Success,
            Err(e) => StepResult::Failure(e.to_string()),
        };
        self.journal
            .record(StepLog::new(label, index, step.clone(), logged, elapsed_ms))
            .await;
        result
    }

    async fn execute_step(&mut self, handle: &DriverHandle, step: &Step) -> Result<(), RunError> {
        let driver = handle.driver()?;
        match step {
            Step::Locate { text } => {
                self.located = Some(self.locate(handle, &Locator::Text(text.clone())).await?);
                Ok(())
            }
            Step::TapLocated => {
                let element = self
                    .located
                    .as_ref()
                    .ok_or_else(|| RunError::InteractionFailure("no element located".to_string()))?;
                tap(handle, element).await
            }
            Step::Tap { text } => {
                let element = self.locate(handle, &Locator::Text(text.clone())).await?;
                tap(handle, &element).await
            }
            Step::ScrollTo { text } => {
                self.located = Some(self.locate(handle, &Locator::scroll_to_text(text)).await?);
                Ok(())
            }
            Step::Back => Ok(driver.back().await?),
            Step::Wait { millis } => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
                Ok(())
            }
            Step::Background { seconds } => Ok(driver.background_app(Duration::from_secs(*seconds)).await?),
            Step::Restart => {
                // Element ids do not survive the app process.
                self.located = None;
                Ok(driver.restart_app().await?)
            }
            Step::AssertText { xpath, check } => {
                let locator = Locator::XPath(xpath.clone());
                let element = match driver.locate(&locator).await? {
                    Located::Found(element) => element,
                    Located::Ambiguous(mut matches) => matches.remove(0),
                    Located::NotFound => return Err(RunError::ElementNotFound(locator.to_string())),
                };
                let text = driver.element_text(&element).await.map_err(interaction_error)?;
                if check.matches(&text) {
                    debug!(text = %text, "assertion holds");
                    Ok(())
                } else {
                    Err(RunError::AssertionFailed(format!("'{}' does not satisfy: {}", text, check)))
                }
            }
            Step::StartActivity { package, activity } => Ok(driver.start_activity(package, activity).await?),
        }
    }

    /// Locates exactly one element, applying the ambiguity policy.
    pub async fn locate(&self, handle: &DriverHandle, locator: &Locator) -> Result<Element, RunError> {
        let located = handle.driver()?.locate(locator).await?;
        if let Located::Ambiguous(matches) = &located {
            if self.policy == AmbiguityPolicy::FirstMatch {
                warn!(locator = %locator, count = matches.len(), "several elements match, using the first");
            }
        }
        self.policy.resolve(located).map_err(|unresolved| match unresolved {
            Located::Ambiguous(matches) => RunError::AmbiguousElement {
                locator: locator.to_string(),
                count: matches.len(),
            },
            _ => RunError::ElementNotFound(locator.to_string()),
        })
    }
}

/// Taps `element`, reporting a detached element as an interaction failure.
async fn tap(handle: &DriverHandle, element: &Element) -> Result<(), RunError> {
    handle.driver()?.click(element).await.map_err(interaction_error)
}

fn interaction_error(err: DriverError) -> RunError {
    match err {
        DriverError::StaleElement(msg) | DriverError::NoSuchElement(msg) => RunError::InteractionFailure(msg),
        other => RunError::Driver(other),
    }
}

/// Runs every entry of `catalog` against one session for `profile`.
///
/// Returns an error only if the session cannot be started. Scenario failures
/// are collected in the report and the remaining entries still run. Each
/// entry's recovery steps run after its scenario, passed or failed; a failed
/// recovery is recorded in [`ScenarioOutcome::recovery_error`]. The session is
/// released exactly once after the last entry; a failed release is recorded in
/// [`SuiteReport::teardown_error`].
pub async fn run_suite(
    connector: &dyn Connector,
    profile: &Profile,
    catalog: &Catalog,
    journal: Option<Arc<StepJournal>>,
) -> Result<SuiteReport, RunError> {
    let journal = journal.unwrap_or_else(|| Arc::new(StepJournal::in_memory()));
    let mut handle = DriverHandle::bootstrap(connector, profile).await?;
    let mut report = SuiteReport::new(profile.device_name.clone(), handle.session_id().map(str::to_string));
    let mut runner = ScenarioRunner::new(profile.ambiguity, journal);

    for entry in catalog.entries() {
        info!(id = %entry.id, "running catalog entry");
        let mut outcome = runner.run(&handle, &entry.scenario).await;
        if !entry.recovery.is_empty() {
            let recovered = runner
                .recover(&handle, entry.label(), outcome.steps_executed, &entry.recovery)
                .await;
            if let Err(e) = recovered {
                outcome.recovery_error = Some(e.to_string());
            }
        }
        report.push(outcome);
    }

    if let Err(e) = handle.release().await {
        report.teardown_error = Some(e.to_string());
    }

    info!(passed = report.passed(), failed = report.failed(), "suite complete");
    Ok(report)
}
