//! Capability descriptor sent when negotiating a new automation session.
//!
//! A [`Capabilities`] value is assembled once per run through
//! [`CapabilitiesBuilder`] and is read-only afterwards. It renders into a
//! new-session request body carrying both the W3C `capabilities` object and
//! the legacy `desiredCapabilities` object, so the same descriptor works with
//! current Appium servers and older device-lab gateways.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use trackprobe_core::capabilities::Capabilities;
//!
//! let caps = Capabilities::builder()
//!     .platform_name("Android")
//!     .device_name("appinsights-appium")
//!     .launch_timeout(Duration::from_millis(5000))
//!     .build();
//!
//! assert_eq!(caps.get("platformName").unwrap(), "Android");
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

/// Capability names defined by W3C WebDriver. Everything else needs a
/// vendor prefix in the `alwaysMatch` object.
const W3C_STANDARD_KEYS: &[&str] = &[
    "acceptInsecureCerts",
    "browserName",
    "browserVersion",
    "pageLoadStrategy",
    "platformName",
    "proxy",
    "setWindowRect",
    "strictFileInteractability",
    "timeouts",
    "unhandledPromptBehavior",
    "webSocketUrl",
];

/// Vendor prefix applied to non-standard keys.
const APPIUM_PREFIX: &str = "appium:";

/// Immutable mapping of capability names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Capabilities {
    entries: BTreeMap<String, Value>,
}

impl Capabilities {
    /// Starts a new builder.
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::default()
    }

    /// Returns the value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the body of a `POST /session` request.
    pub fn new_session_body(&self) -> Value {
        let always_match: Map<String, Value> = self
            .iter()
            .map(|(k, v)| (w3c_key(k), v.clone()))
            .collect();
        let desired: Map<String, Value> = self
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        json!({
            "capabilities": {
                "alwaysMatch": always_match,
                "firstMatch": [{}],
            },
            "desiredCapabilities": desired,
        })
    }
}

fn w3c_key(key: &str) -> String {
    if key.contains(':') || W3C_STANDARD_KEYS.contains(&key) {
        key.to_string()
    } else {
        format!("{}{}", APPIUM_PREFIX, key)
    }
}

/// Builder for [`Capabilities`].
#[derive(Debug, Default)]
pub struct CapabilitiesBuilder {
    entries: BTreeMap<String, Value>,
}

impl CapabilitiesBuilder {
    /// Sets an arbitrary capability, replacing any previous value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Sets `key` only when `value` is `Some`.
    pub fn set_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    pub fn platform_name(self, name: impl Into<String>) -> Self {
        self.set("platformName", name.into())
    }

    pub fn device_name(self, name: impl Into<String>) -> Self {
        self.set("deviceName", name.into())
    }

    /// Path or URL of the app binary to install.
    pub fn app(self, app: impl Into<String>) -> Self {
        self.set("app", app.into())
    }

    pub fn app_package(self, package: impl Into<String>) -> Self {
        self.set("appPackage", package.into())
    }

    pub fn app_activity(self, activity: impl Into<String>) -> Self {
        self.set("appActivity", activity.into())
    }

    /// How long the server waits for the app to launch, sent in milliseconds.
    pub fn launch_timeout(self, timeout: Duration) -> Self {
        self.set("launchTimeout", timeout.as_millis() as u64)
    }

    /// Freezes the descriptor.
    pub fn build(self) -> Capabilities {
        Capabilities {
            entries: self.entries,
        }
    }
}
