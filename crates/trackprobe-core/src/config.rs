//! Session profiles and persistent configuration.
//!
//! A [`Profile`] describes one way of reaching a device: which automation
//! endpoint to talk to, which app to launch and which capabilities to send.
//! Three profiles are built in (`local-emulator`, `device-grid`, `ci`); a
//! config file at `~/.trackprobe/config.json` can add new ones or replace the
//! built-ins by name.
//!
//! # Example
//!
//! ```no_run
//! use trackprobe_core::config::TrackprobeConfig;
//!
//! let config = TrackprobeConfig::load().expect("config");
//! let profile = config.profile("device-grid").expect("profile");
//! println!("endpoint: {}", profile.server_url);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::capabilities::Capabilities;
use crate::element::AmbiguityPolicy;

const CONFIG_FILENAME: &str = "config.json";

/// Package name of the sample app on emulators and CI images.
const SAMPLE_APP_PACKAGE: &str = "com.microsoft.applicationinsights.appsample";

/// Default Appium endpoint.
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:4723/wd/hub";

/// Returns the trackprobe state directory (`~/.trackprobe`).
pub fn trackprobe_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".trackprobe")
}

/// Returns the default step-journal directory (`~/.trackprobe/logs`).
pub fn logs_dir() -> PathBuf {
    trackprobe_dir().join("logs")
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("invalid server url '{0}': expected http:// or https://")]
    InvalidUrl(String),
}

/// Device-farm routing attached to a profile.
///
/// `routing` entries are sent verbatim as capabilities. When `session_id_key`
/// is set, a fresh UUID is generated under that capability name every time
/// the capability descriptor is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFarm {
    #[serde(default)]
    pub routing: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id_key: Option<String>,
}

/// One session configuration variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Base URL of the automation endpoint, e.g. `http://127.0.0.1:4723/wd/hub`.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    pub platform_name: String,

    /// Host platform requested from a device lab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    pub device_name: String,

    /// Path or URL of the APK to install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_package: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_activity: Option<String>,

    /// Activity to start explicitly once the session is up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_activity: Option<String>,

    #[serde(default = "default_implicit_wait_secs")]
    pub implicit_wait_secs: u64,

    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,

    /// Client-side timeout for a single HTTP command.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_farm: Option<DeviceFarm>,

    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_capabilities: BTreeMap<String, Value>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_implicit_wait_secs() -> u64 {
    10
}

fn default_launch_timeout_ms() -> u64 {
    5000
}

fn default_command_timeout_secs() -> u64 {
    60
}

impl Profile {
    /// Emulator on the developer machine, installing the locally built APK.
    pub fn local_emulator() -> Self {
        Self {
            server_url: default_server_url(),
            platform_name: "Android".to_string(),
            platform: None,
            device_name: "appinsights-appium".to_string(),
            app: Some("../app-sample/build/outputs/apk/app-sample-debug.apk".to_string()),
            app_package: Some(SAMPLE_APP_PACKAGE.to_string()),
            app_activity: None,
            launch_activity: None,
            implicit_wait_secs: 10,
            launch_timeout_ms: 5000,
            command_timeout_secs: default_command_timeout_secs(),
            device_farm: None,
            ambiguity: AmbiguityPolicy::FirstMatch,
            extra_capabilities: BTreeMap::new(),
        }
    }

    /// Remote device lab session. The APK URL and lab endpoint must be
    /// supplied through the config file or command-line overrides.
    pub fn device_grid() -> Self {
        let mut routing = BTreeMap::new();
        routing.insert("olympusTeam".to_string(), "BingExperience".to_string());
        Self {
            server_url: default_server_url(),
            platform_name: "android".to_string(),
            platform: Some("WINDOWS".to_string()),
            device_name: "android".to_string(),
            app: None,
            app_package: Some("com.microsoft.applicationinsights.sampleapp".to_string()),
            app_activity: Some(
                "com.microsoft.applicationinsights.appsample.ItemListActivity".to_string(),
            ),
            launch_activity: None,
            implicit_wait_secs: 10,
            launch_timeout_ms: 5000,
            command_timeout_secs: default_command_timeout_secs(),
            device_farm: Some(DeviceFarm {
                routing,
                session_id_key: Some("olympusSessionId".to_string()),
            }),
            ambiguity: AmbiguityPolicy::FirstMatch,
            extra_capabilities: BTreeMap::new(),
        }
    }

    /// Preinstalled app on a CI emulator, launched by activity.
    pub fn ci() -> Self {
        Self {
            server_url: default_server_url(),
            platform_name: "Android".to_string(),
            platform: None,
            device_name: "appinsights-appium".to_string(),
            app: None,
            app_package: Some(SAMPLE_APP_PACKAGE.to_string()),
            app_activity: Some(".ItemListActivity".to_string()),
            launch_activity: Some(".ItemListActivity".to_string()),
            implicit_wait_secs: 20,
            launch_timeout_ms: 5000,
            command_timeout_secs: default_command_timeout_secs(),
            device_farm: None,
            ambiguity: AmbiguityPolicy::FirstMatch,
            extra_capabilities: BTreeMap::new(),
        }
    }

    pub fn implicit_wait(&self) -> Duration {
        Duration::from_secs(self.implicit_wait_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Checks fields that would otherwise only fail at session start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        Ok(())
    }

    /// Builds the capability descriptor for one run.
    pub fn capabilities(&self) -> Capabilities {
        let mut builder = Capabilities::builder()
            .platform_name(self.platform_name.clone())
            .device_name(self.device_name.clone())
            .launch_timeout(Duration::from_millis(self.launch_timeout_ms))
            .set_opt("platform", self.platform.clone())
            .set_opt("app", self.app.clone())
            .set_opt("appPackage", self.app_package.clone())
            .set_opt("appActivity", self.app_activity.clone());

        if let Some(farm) = &self.device_farm {
            for (key, value) in &farm.routing {
                builder = builder.set(key.clone(), value.clone());
            }
            if let Some(key) = &farm.session_id_key {
                builder = builder.set(key.clone(), Uuid::new_v4().to_string());
            }
        }

        for (key, value) in &self.extra_capabilities {
            builder = builder.set(key.clone(), value.clone());
        }

        builder.build()
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, overrides: &ProfileOverrides) {
        if let Some(url) = &overrides.server_url {
            self.server_url = url.clone();
        }
        if let Some(app) = &overrides.app {
            self.app = Some(app.clone());
        }
        if let Some(device) = &overrides.device_name {
            self.device_name = device.clone();
        }
        if let Some(policy) = overrides.ambiguity {
            self.ambiguity = policy;
        }
    }
}

/// Field overrides supplied at run time.
#[derive(Debug, Clone, Default)]
pub struct ProfileOverrides {
    pub server_url: Option<String>,
    pub app: Option<String>,
    pub device_name: Option<String>,
    pub ambiguity: Option<AmbiguityPolicy>,
}

/// Persistent trackprobe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackprobeConfig {
    /// Profile used when none is named on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Directory for step journals; defaults to `~/.trackprobe/logs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// User-defined profiles. These shadow built-ins with the same name.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl TrackprobeConfig {
    /// Loads `~/.trackprobe/config.json`, or defaults if the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = trackprobe_dir().join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads a config file from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The built-in profiles by name.
    pub fn builtin_profiles() -> BTreeMap<String, Profile> {
        let mut profiles = BTreeMap::new();
        profiles.insert("local-emulator".to_string(), Profile::local_emulator());
        profiles.insert("device-grid".to_string(), Profile::device_grid());
        profiles.insert("ci".to_string(), Profile::ci());
        profiles
    }

    /// All profile names, built-in and user-defined, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Self::builtin_profiles().into_keys().collect();
        for name in self.profiles.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    /// Name of the profile to use when none is given explicitly.
    pub fn default_profile_name(&self) -> &str {
        self.default_profile.as_deref().unwrap_or("local-emulator")
    }

    /// Looks up a profile, preferring user-defined entries.
    pub fn profile(&self, name: &str) -> Result<Profile, ConfigError> {
        self.profiles
            .get(name)
            .cloned()
            .or_else(|| Self::builtin_profiles().remove(name))
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(logs_dir)
    }
}
