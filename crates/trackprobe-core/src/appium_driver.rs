//! [`MobileDriver`] implementation backed by an Appium session.
//!
//! [`AppiumDriver`] owns one remote session on an [`AppiumClient`] and maps
//! each trait operation onto a WebDriver or Appium extension command:
//!
//! | Operation          | Command                                            |
//! |--------------------|----------------------------------------------------|
//! | implicit wait      | `POST /session/{id}/timeouts`                      |
//! | find elements      | `POST /session/{id}/elements`                      |
//! | click              | `POST /session/{id}/element/{eid}/click`           |
//! | element text       | `GET /session/{id}/element/{eid}/text`             |
//! | back               | `POST /session/{id}/back`                          |
//! | background app     | `POST /session/{id}/appium/app/background`         |
//! | terminate/activate | `POST /session/{id}/execute/sync` (`mobile:` ext.) |
//! | start activity     | `POST /session/{id}/appium/device/start_activity`  |
//! | quit               | `DELETE /session/{id}`                             |

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::appium_client::{AppiumClient, AppiumClientError};
use crate::capabilities::Capabilities;
use crate::driver::{DriverError, MobileDriver};
use crate::element::{Element, Locator, LEGACY_ELEMENT_KEY, W3C_ELEMENT_KEY};

/// Extra request time allowed on top of a background duration.
const BACKGROUND_GRACE: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Maps an [`AppiumClientError`] to a [`DriverError`].
fn map_client_error(err: AppiumClientError) -> DriverError {
    match err {
        AppiumClientError::Remote { error, message } => match error.as_str() {
            "no such element" => DriverError::NoSuchElement(message),
            "stale element reference" => DriverError::StaleElement(message),
            "invalid session id" => DriverError::SessionClosed,
            _ => DriverError::CommandFailed(format!("{error}: {message}")),
        },
        AppiumClientError::Http(e) => DriverError::Transport(e.to_string()),
        AppiumClientError::Status { code, body } => {
            DriverError::CommandFailed(format!("HTTP {code}: {body}"))
        }
        AppiumClientError::Decode(msg) => DriverError::InvalidResponse(msg),
        AppiumClientError::MissingSessionId => {
            DriverError::InvalidResponse("missing session id".to_string())
        }
    }
}

/// Reads the app package from granted capabilities, prefixed or not.
fn granted_app_package(granted: &Value) -> Option<String> {
    ["appPackage", "appium:appPackage"]
        .iter()
        .find_map(|key| granted.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Extracts an element id from a W3C or legacy element reference object.
fn element_id(value: &Value) -> Option<String> {
    value
        .get(W3C_ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// AppiumDriver
// ---------------------------------------------------------------------------

/// A [`MobileDriver`] bound to one Appium session.
pub struct AppiumDriver {
    client: AppiumClient,
    session_id: String,
    /// Package of the app under test; required for terminate/activate.
    app_package: Option<String>,
    closed: AtomicBool,
}

impl AppiumDriver {
    /// Opens a new session on `client` with the given capabilities.
    ///
    /// The app package used for restarts is taken from the requested
    /// `appPackage` capability, or from the granted capabilities when the
    /// request only named an APK.
    pub async fn start(client: AppiumClient, capabilities: &Capabilities) -> Result<Self, AppiumClientError> {
        let session = client.new_session(capabilities).await?;
        debug!(granted = %session.capabilities, "capabilities granted");
        let app_package = capabilities
            .get("appPackage")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| granted_app_package(&session.capabilities));
        info!(session_id = %session.session_id, endpoint = client.base_url(), "appium session started");
        Ok(Self {
            client,
            session_id: session.session_id,
            app_package,
            closed: AtomicBool::new(false),
        })
    }

    /// Wraps an existing session id.
    pub fn attach(client: AppiumClient, session_id: impl Into<String>, app_package: Option<String>) -> Self {
        Self {
            client,
            session_id: session_id.into(),
            app_package,
            closed: AtomicBool::new(false),
        }
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DriverError::SessionClosed)
        } else {
            Ok(())
        }
    }

    async fn post(&self, suffix: &str, body: Value) -> Result<Value, DriverError> {
        self.ensure_open()?;
        self.client
            .post(&self.path(suffix), &body)
            .await
            .map_err(map_client_error)
    }

    fn app_package(&self) -> Result<&str, DriverError> {
        self.app_package
            .as_deref()
            .ok_or_else(|| DriverError::CommandFailed("no appPackage configured for this session".to_string()))
    }

    async fn execute_mobile(&self, command: &str, args: Value) -> Result<Value, DriverError> {
        self.post(
            "/execute/sync",
            json!({ "script": format!("mobile: {command}"), "args": [args] }),
        )
        .await
    }
}

#[async_trait]
impl MobileDriver for AppiumDriver {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn set_implicit_wait(&self, wait: Duration) -> Result<(), DriverError> {
        let ms = wait.as_millis() as u64;
        // W3C reads `implicit`; JSONWP gateways read `type` + `ms`.
        self.post("/timeouts", json!({ "implicit": ms, "type": "implicit", "ms": ms }))
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, locator), fields(locator = %locator))]
    async fn find_elements(&self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        let body = json!({ "using": locator.strategy(), "value": locator.query() });
        let value = match self.post("/elements", body).await {
            Ok(v) => v,
            // Some gateways answer an empty lookup with an error instead of [].
            Err(DriverError::NoSuchElement(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let items = value
            .as_array()
            .ok_or_else(|| DriverError::InvalidResponse(format!("expected element list, got {value}")))?;
        let elements = items
            .iter()
            .map(|item| {
                element_id(item)
                    .map(|id| Element {
                        id,
                        locator: locator.clone(),
                    })
                    .ok_or_else(|| DriverError::InvalidResponse(format!("not an element reference: {item}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = elements.len(), "elements found");
        Ok(elements)
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        self.post(&format!("/element/{}/click", element.id), json!({}))
            .await
            .map(|_| ())
    }

    async fn element_text(&self, element: &Element) -> Result<String, DriverError> {
        self.ensure_open()?;
        let value = self
            .client
            .get(&self.path(&format!("/element/{}/text", element.id)))
            .await
            .map_err(map_client_error)?;
        match value {
            Value::String(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(DriverError::InvalidResponse(format!("expected text, got {other}"))),
        }
    }

    async fn back(&self) -> Result<(), DriverError> {
        self.post("/back", json!({})).await.map(|_| ())
    }

    async fn background_app(&self, duration: Duration) -> Result<(), DriverError> {
        self.ensure_open()?;
        // The endpoint holds the request open while the app is backgrounded.
        let timeout = duration + BACKGROUND_GRACE;
        self.client
            .post_with_timeout(
                &self.path("/appium/app/background"),
                &json!({ "seconds": duration.as_secs_f64() }),
                timeout,
            )
            .await
            .map(|_| ())
            .map_err(map_client_error)
    }

    async fn terminate_app(&self) -> Result<(), DriverError> {
        let package = self.app_package()?.to_string();
        self.execute_mobile("terminateApp", json!({ "appId": package }))
            .await
            .map(|_| ())
    }

    async fn activate_app(&self) -> Result<(), DriverError> {
        let package = self.app_package()?.to_string();
        self.execute_mobile("activateApp", json!({ "appId": package }))
            .await
            .map(|_| ())
    }

    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), DriverError> {
        self.post(
            "/appium/device/start_activity",
            json!({ "appPackage": package, "appActivity": activity }),
        )
        .await
        .map(|_| ())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DriverError::SessionClosed);
        }
        self.client
            .delete(&self.path(""))
            .await
            .map(|_| ())
            .map_err(map_client_error)
    }
}
