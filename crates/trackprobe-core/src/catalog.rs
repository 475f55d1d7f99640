//! The scenario catalog.
//!
//! [`Catalog::telemetry`] is the fixed cross-product of in-app toggles the
//! sample app exposes (session management on/off, page-view tracking on/off).
//! Every entry applies its toggles, runs the shared baseline scenario, then
//! crashes the app, except the last entry, which disables both features and
//! leaves the app running. Crash entries carry recovery steps (restart and
//! settle) that [`run_suite`](crate::runner::run_suite) runs after the
//! scenario whether or not it passed.
//!
//! The baseline taps "Track event" five times, backgrounds the app in two
//! patterns, taps "Track event" five more times and triggers a sync.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::step::{Scenario, Step, TextCheck};

/// Button that records a custom event.
pub const TRACK_EVENT: &str = "Track event";

/// Button that flushes queued telemetry.
pub const TRIGGER_SYNC: &str = "Trigger Synchronize";

/// Button that throws an unhandled exception in the app.
pub const CRASH_APP: &str = "Crash the App!";

/// Tap-then-back cycles per "Track event" burst.
pub const TAP_CYCLES: usize = 5;

/// Pause after a restart before the next scenario starts.
const RESTART_SETTLE: Duration = Duration::from_secs(3);

/// Errors raised while loading a catalog file.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// An in-app setting switched before the baseline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Toggle {
    DisableSessionManagement,
    EnableSessionManagement,
    DisablePageViews,
    EnablePageViews,
}

impl Toggle {
    /// Visible text of the button that applies this toggle.
    pub fn button_text(self) -> &'static str {
        match self {
            Toggle::DisableSessionManagement => "Disable session management",
            Toggle::EnableSessionManagement => "Enable session management",
            Toggle::DisablePageViews => "Disable page view tracking",
            Toggle::EnablePageViews => "Enable page view tracking",
        }
    }

    /// Steps that apply the toggle and return to the list.
    pub fn steps(self) -> [Step; 2] {
        [Step::tap(self.button_text()), Step::Back]
    }
}

/// One catalog entry: a toggle state and the scenario run under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Short identifier, e.g. `disable-pageviews`.
    pub id: String,
    #[serde(default)]
    pub toggles: Vec<Toggle>,
    pub scenario: Scenario,
    /// Steps that return the app to a usable state. Run after the scenario
    /// even when one of its steps failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery: Vec<Step>,
}

impl CatalogEntry {
    pub fn label(&self) -> &str {
        &self.scenario.label
    }
}

/// `count` cycles of tapping the located element and going back.
fn tap_back_cycles(count: usize) -> impl Iterator<Item = Step> {
    (0..count).flat_map(|_| [Step::TapLocated, Step::Back])
}

/// The shared baseline scenario steps.
pub fn baseline_steps() -> Vec<Step> {
    let mut steps = Vec::new();

    steps.push(Step::locate(TRACK_EVENT));
    steps.extend(tap_back_cycles(TAP_CYCLES));

    steps.extend([
        Step::background(Duration::from_secs(3)),
        Step::wait(Duration::from_secs(2)),
        Step::background(Duration::from_secs(3)),
        Step::wait(Duration::from_secs(2)),
        Step::background(Duration::from_secs(3)),
    ]);

    steps.push(Step::locate(TRACK_EVENT));
    steps.extend(tap_back_cycles(TAP_CYCLES));

    steps.extend([
        Step::background(Duration::from_secs(10)),
        Step::wait(Duration::from_secs(2)),
    ]);

    steps.extend([
        Step::locate(TRIGGER_SYNC),
        Step::TapLocated,
        Step::Back,
        Step::wait(Duration::from_secs(5)),
        Step::TapLocated,
        Step::Back,
    ]);

    steps
}

/// Restart-and-settle run after every crash entry.
pub fn restart_and_settle_steps() -> Vec<Step> {
    vec![Step::Restart, Step::wait(RESTART_SETTLE)]
}

/// An ordered list of catalog entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds one entry: toggles, baseline, and optionally a crash tap with
    /// restart-and-settle recovery.
    pub fn compose(id: &str, label: &str, toggles: &[Toggle], crash: bool) -> CatalogEntry {
        let mut scenario = Scenario::new(label);
        for toggle in toggles {
            scenario = scenario.steps(toggle.steps());
        }
        scenario = scenario.steps(baseline_steps());
        let recovery = if crash {
            scenario = scenario.step(Step::tap(CRASH_APP));
            restart_and_settle_steps()
        } else {
            Vec::new()
        };
        CatalogEntry {
            id: id.to_string(),
            toggles: toggles.to_vec(),
            scenario,
            recovery,
        }
    }

    /// The telemetry toggle catalog.
    pub fn telemetry() -> Self {
        use Toggle::*;
        Self {
            entries: vec![
                Self::compose("baseline", "Run default tests", &[], true),
                Self::compose(
                    "disable-session-mgmt",
                    "Run with disabled session management",
                    &[DisableSessionManagement],
                    true,
                ),
                Self::compose(
                    "re-enable-session-mgmt",
                    "Run with re-enabled session management",
                    &[EnableSessionManagement],
                    true,
                ),
                Self::compose("disable-pageviews", "Run with disabled pageviews", &[DisablePageViews], true),
                Self::compose(
                    "re-enable-pageviews",
                    "Run with re-enabled pageviews",
                    &[EnablePageViews],
                    true,
                ),
                Self::compose(
                    "disable-both",
                    "Run with disabled pageviews and session management",
                    &[DisablePageViews, DisableSessionManagement],
                    false,
                ),
            ],
        }
    }

    /// Device settings check: the Android version shown under "About phone"
    /// is numeric. Needs a profile targeting the settings app.
    pub fn settings() -> Self {
        let version_label = "Android version";
        let view = "android.widget.TextView";
        let xpath = format!(
            "//{view}[preceding-sibling::{view}[@text={}]]",
            crate::element::xpath_literal(version_label)
        );
        let scenario = Scenario::new("About phone shows numeric android version").steps([
            Step::scroll_to("About phone"),
            Step::TapLocated,
            Step::scroll_to(version_label),
            Step::AssertText {
                xpath,
                check: TextCheck::ContainsDigit,
            },
        ]);
        Self {
            entries: vec![CatalogEntry {
                id: "about-phone-version".to_string(),
                toggles: Vec::new(),
                scenario,
                recovery: Vec::new(),
            }],
        }
    }

    /// Loads a catalog from a JSON file of the form `{"entries": [...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Keeps entries whose id or label contains `pattern` (case-insensitive).
    pub fn filter(self, pattern: &str) -> Self {
        let needle = pattern.to_lowercase();
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|e| e.id.to_lowercase().contains(&needle) || e.label().to_lowercase().contains(&needle))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_catalog_order() {
        let binding = Catalog::telemetry();
        let ids: Vec<&str> = binding.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "baseline",
                "disable-session-mgmt",
                "re-enable-session-mgmt",
                "disable-pageviews",
                "re-enable-pageviews",
                "disable-both",
            ]
        );
    }

    #[test]
    fn baseline_has_five_tap_back_cycles_before_backgrounding() {
        let steps = baseline_steps();
        let first_background = steps
            .iter()
            .position(|s| matches!(s, Step::Background { .. }))
            .unwrap();
        assert_eq!(steps[0], Step::locate(TRACK_EVENT));
        let before = &steps[1..first_background];
        assert_eq!(before.len(), 2 * TAP_CYCLES);
        assert!(before.chunks(2).all(|pair| pair == [Step::TapLocated, Step::Back]));
    }

    #[test]
    fn baseline_background_patterns() {
        let backgrounds: Vec<u64> = baseline_steps()
            .iter()
            .filter_map(|s| match s {
                Step::Background { seconds } => Some(*seconds),
                _ => None,
            })
            .collect();
        assert_eq!(backgrounds, vec![3, 3, 3, 10]);
    }

    #[test]
    fn baseline_ends_with_sync_trigger() {
        let steps = baseline_steps();
        assert_eq!(
            &steps[steps.len() - 6..],
            &[
                Step::locate(TRIGGER_SYNC),
                Step::TapLocated,
                Step::Back,
                Step::Wait { millis: 5000 },
                Step::TapLocated,
                Step::Back,
            ]
        );
    }

    #[test]
    fn crash_entries_recover_outside_the_scenario() {
        let catalog = Catalog::telemetry();
        for entry in &catalog.entries[..5] {
            let steps = &entry.scenario.steps;
            assert_eq!(steps.last(), Some(&Step::tap(CRASH_APP)), "{}", entry.id);
            assert!(!steps.contains(&Step::Restart), "{}", entry.id);
            assert_eq!(entry.recovery, vec![Step::Restart, Step::Wait { millis: 3000 }], "{}", entry.id);
        }
    }

    #[test]
    fn disable_both_has_no_crash() {
        let catalog = Catalog::telemetry();
        let entry = catalog.entries.last().unwrap();
        let mut expected = vec![
            Step::tap("Disable page view tracking"),
            Step::Back,
            Step::tap("Disable session management"),
            Step::Back,
        ];
        expected.extend(baseline_steps());
        assert_eq!(entry.scenario.steps, expected);
        assert!(!entry.scenario.steps.contains(&Step::Restart));
        assert!(entry.recovery.is_empty());
    }

    #[test]
    fn settings_catalog_queries_adjacent_label() {
        let catalog = Catalog::settings();
        match &catalog.entries[0].scenario.steps[3] {
            Step::AssertText { xpath, check } => {
                assert_eq!(
                    xpath,
                    r#"//android.widget.TextView[preceding-sibling::android.widget.TextView[@text="Android version"]]"#
                );
                assert_eq!(check, &TextCheck::ContainsDigit);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn filter_matches_id_or_label() {
        assert_eq!(Catalog::telemetry().filter("pageviews").len(), 3);
        assert_eq!(Catalog::telemetry().filter("DEFAULT").len(), 1);
        assert!(Catalog::telemetry().filter("nothing").is_empty());
    }

    #[test]
    fn catalog_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_string(&Catalog::settings()).unwrap()).unwrap();
        assert_eq!(Catalog::from_json_file(&path).unwrap(), Catalog::settings());
    }

    #[test]
    fn catalog_file_keeps_recovery_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash.json");
        std::fs::write(
            &path,
            r#"{"entries": [{"id": "crash", "scenario": {"label": "Crash", "steps": [
                {"type": "tap", "text": "Crash the App!"}
            ]}, "recovery": [{"type": "restart"}]}]}"#,
        )
        .unwrap();
        let catalog = Catalog::from_json_file(&path).unwrap();
        assert_eq!(catalog.entries[0].recovery, vec![Step::Restart]);
    }

    #[test]
    fn catalog_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Catalog::from_json_file(&dir.path().join("missing.json")),
            Err(CatalogError::Io(_))
        ));
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"entries": [{"id": 1}]}"#).unwrap();
        assert!(matches!(Catalog::from_json_file(&path), Err(CatalogError::Parse(_))));
    }
}
