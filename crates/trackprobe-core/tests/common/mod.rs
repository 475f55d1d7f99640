//! Shared test helpers for trackprobe-core integration tests.
//!
//! Two backends are provided: [`FakeDriver`], an in-memory model of the sample
//! app used with paused tokio time, and [`MockAppium`], an HTTP endpoint that
//! speaks enough of the WebDriver wire protocol to exercise the real client.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use trackprobe_core::capabilities::Capabilities;
use trackprobe_core::catalog::{Toggle, CRASH_APP, TRACK_EVENT, TRIGGER_SYNC};
use trackprobe_core::config::Profile;
use trackprobe_core::driver::{DriverError, MobileDriver};
use trackprobe_core::element::{Element, Locator, W3C_ELEMENT_KEY};
use trackprobe_core::error::RunError;
use trackprobe_core::session::Connector;

// ---------------------------------------------------------------------------
// In-memory driver
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FakeState {
    /// Bumped whenever the app process dies; older element ids go stale.
    generation: u64,
    /// Visible text -> number of elements carrying it.
    buttons: HashMap<String, usize>,
    /// XPath -> text of the element it selects.
    labels: HashMap<String, String>,
    crashed: bool,
    closed: bool,
    calls: Vec<String>,
    quits: usize,
    fail_implicit_wait: bool,
    fail_quit: bool,
    /// The next crash tap kills the app and then reports a command failure.
    fail_after_crash: bool,
    fail_terminate: bool,
}

/// In-memory model of the sample app behind a session.
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    /// The sample app's main screen with every button present once.
    pub fn sample_app() -> Self {
        let driver = Self::default();
        for text in [TRACK_EVENT, TRIGGER_SYNC, CRASH_APP] {
            driver.with_button(text, 1);
        }
        for toggle in [
            Toggle::DisableSessionManagement,
            Toggle::EnableSessionManagement,
            Toggle::DisablePageViews,
            Toggle::EnablePageViews,
        ] {
            driver.with_button(toggle.button_text(), 1);
        }
        driver
    }

    pub fn with_button(&self, text: &str, count: usize) -> &Self {
        self.state.lock().unwrap().buttons.insert(text.to_string(), count);
        self
    }

    pub fn without_button(&self, text: &str) -> &Self {
        self.state.lock().unwrap().buttons.remove(text);
        self
    }

    pub fn with_label(&self, xpath: &str, text: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .labels
            .insert(xpath.to_string(), text.to_string());
        self
    }

    pub fn fail_implicit_wait(&self) {
        self.state.lock().unwrap().fail_implicit_wait = true;
    }

    pub fn fail_quit(&self) {
        self.state.lock().unwrap().fail_quit = true;
    }

    pub fn fail_after_crash(&self) {
        self.state.lock().unwrap().fail_after_crash = true;
    }

    pub fn fail_terminate(&self) {
        self.state.lock().unwrap().fail_terminate = true;
    }

    /// Number of calls equal to `call`.
    pub fn count(&self, call: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| *c == call).count()
    }

    /// Every command received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn quits(&self) -> usize {
        self.state.lock().unwrap().quits
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn open(&self) -> Result<std::sync::MutexGuard<'_, FakeState>, DriverError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(DriverError::SessionClosed);
        }
        Ok(state)
    }
}

fn element_id(generation: u64, key: &str, index: usize) -> String {
    format!("{generation}|{key}|{index}")
}

fn parse_element_id(id: &str) -> (u64, &str) {
    let mut parts = id.splitn(3, '|');
    let generation = parts.next().and_then(|g| g.parse().ok()).unwrap_or(u64::MAX);
    (generation, parts.next().unwrap_or_default())
}

#[async_trait]
impl MobileDriver for FakeDriver {
    fn session_id(&self) -> &str {
        "fake-session"
    }

    async fn set_implicit_wait(&self, wait: Duration) -> Result<(), DriverError> {
        let mut state = self.open()?;
        state.calls.push(format!("implicit_wait:{}", wait.as_secs()));
        if state.fail_implicit_wait {
            return Err(DriverError::CommandFailed("timeouts rejected".to_string()));
        }
        Ok(())
    }

    async fn find_elements(&self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        let mut state = self.open()?;
        state.calls.push(format!("find:{locator}"));
        if state.crashed {
            return Ok(Vec::new());
        }
        let (key, count) = match locator {
            Locator::Text(text) => (text.clone(), state.buttons.get(text).copied().unwrap_or(0)),
            Locator::XPath(xpath) => (xpath.clone(), usize::from(state.labels.contains_key(xpath))),
            Locator::UiAutomator(selector) => match state
                .buttons
                .keys()
                .find(|text| selector.contains(&format!("text(\"{text}\")")))
            {
                Some(text) => (text.clone(), 1),
                None => (String::new(), 0),
            },
        };
        Ok((0..count)
            .map(|i| Element {
                id: element_id(state.generation, &key, i),
                locator: locator.clone(),
            })
            .collect())
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        let mut state = self.open()?;
        let (generation, text) = parse_element_id(&element.id);
        if generation != state.generation || state.crashed {
            return Err(DriverError::StaleElement(element.id.clone()));
        }
        state.calls.push(format!("click:{text}"));
        if text == CRASH_APP {
            state.crashed = true;
            state.generation += 1;
            if std::mem::take(&mut state.fail_after_crash) {
                return Err(DriverError::CommandFailed("instrumentation process crashed".to_string()));
            }
        }
        Ok(())
    }

    async fn element_text(&self, element: &Element) -> Result<String, DriverError> {
        let state = self.open()?;
        let (_, key) = parse_element_id(&element.id);
        state
            .labels
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::StaleElement(element.id.clone()))
    }

    async fn back(&self) -> Result<(), DriverError> {
        self.open()?.calls.push("back".to_string());
        Ok(())
    }

    async fn background_app(&self, duration: Duration) -> Result<(), DriverError> {
        self.open()?
            .calls
            .push(format!("background:{}", duration.as_secs()));
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn terminate_app(&self) -> Result<(), DriverError> {
        let mut state = self.open()?;
        state.calls.push("terminate".to_string());
        if state.fail_terminate {
            return Err(DriverError::CommandFailed("terminateApp refused".to_string()));
        }
        state.generation += 1;
        Ok(())
    }

    async fn activate_app(&self) -> Result<(), DriverError> {
        let mut state = self.open()?;
        state.calls.push("activate".to_string());
        state.crashed = false;
        Ok(())
    }

    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), DriverError> {
        self.open()?
            .calls
            .push(format!("start_activity:{package}/{activity}"));
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.quits += 1;
        if state.closed {
            return Err(DriverError::SessionClosed);
        }
        state.closed = true;
        if state.fail_quit {
            return Err(DriverError::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}

/// [`Connector`] handing out one shared [`FakeDriver`].
pub struct FakeConnector {
    pub driver: Arc<FakeDriver>,
    refuse: bool,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(driver: FakeDriver) -> Self {
        Self {
            driver: Arc::new(driver),
            refuse: false,
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose endpoint rejects every session request.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(FakeDriver::sample_app())
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _profile: &Profile,
        _capabilities: &Capabilities,
    ) -> Result<Arc<dyn MobileDriver>, RunError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(RunError::SessionStartFailure("connection refused".to_string()));
        }
        Ok(self.driver.clone() as Arc<dyn MobileDriver>)
    }
}

// ---------------------------------------------------------------------------
// Mock Appium HTTP endpoint
// ---------------------------------------------------------------------------

pub const MOCK_SESSION_ID: &str = "mock-session";

/// Envelope flavor the mock answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    W3c,
    Legacy,
}

/// One request the mock received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    /// Path relative to the `/wd/hub` base.
    pub path: String,
    pub body: Value,
}

/// Scripted behavior of the mock endpoint.
#[derive(Debug)]
pub struct MockConfig {
    protocol: Protocol,
    /// Locator query -> element ids.
    elements: HashMap<String, Vec<String>>,
    texts: HashMap<String, String>,
    stale: HashSet<String>,
    reject_session: bool,
}

impl MockConfig {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            elements: HashMap::new(),
            texts: HashMap::new(),
            stale: HashSet::new(),
            reject_session: false,
        }
    }

    /// Makes `locator` resolve to elements with the given ids.
    pub fn element(mut self, locator: &Locator, ids: &[&str]) -> Self {
        self.elements
            .insert(locator.query(), ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn text(mut self, id: &str, text: &str) -> Self {
        self.texts.insert(id.to_string(), text.to_string());
        self
    }

    /// Clicking `id` reports a stale element reference.
    pub fn stale(mut self, id: &str) -> Self {
        self.stale.insert(id.to_string());
        self
    }

    pub fn reject_session(mut self) -> Self {
        self.reject_session = true;
        self
    }
}

struct MockState {
    config: MockConfig,
    calls: Vec<RecordedCall>,
}

type SharedMock = Arc<Mutex<MockState>>;

/// A running mock endpoint on an ephemeral port.
pub struct MockAppium {
    pub addr: SocketAddr,
    state: SharedMock,
}

impl MockAppium {
    pub async fn start(config: MockConfig) -> Self {
        let state: SharedMock = Arc::new(Mutex::new(MockState {
            config,
            calls: Vec::new(),
        }));
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}/wd/hub", self.addr)
    }

    /// A local-emulator profile pointed at this mock.
    pub fn profile(&self) -> Profile {
        let mut profile = Profile::local_emulator();
        profile.server_url = self.server_url();
        profile.command_timeout_secs = 5;
        profile
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose method matches and whose path ends with `suffix`.
    pub fn calls_to(&self, method: &str, suffix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path.ends_with(suffix))
            .collect()
    }
}

fn success(protocol: Protocol, value: Value) -> (StatusCode, Json<Value>) {
    let body = match protocol {
        Protocol::W3c => json!({ "value": value }),
        Protocol::Legacy => json!({ "status": 0, "sessionId": MOCK_SESSION_ID, "value": value }),
    };
    (StatusCode::OK, Json(body))
}

fn failure(protocol: Protocol, error: &str, legacy_status: i64, message: &str) -> (StatusCode, Json<Value>) {
    match protocol {
        Protocol::W3c => (
            StatusCode::NOT_FOUND,
            Json(json!({ "value": { "error": error, "message": message, "stacktrace": "" } })),
        ),
        Protocol::Legacy => (
            StatusCode::OK,
            Json(json!({ "status": legacy_status, "value": { "message": message } })),
        ),
    }
}

fn element_ref(protocol: Protocol, id: &str) -> Value {
    match protocol {
        Protocol::W3c => json!({ W3C_ELEMENT_KEY: id }),
        Protocol::Legacy => json!({ "ELEMENT": id }),
    }
}

async fn handle(State(state): State<SharedMock>, method: Method, uri: Uri, body: Bytes) -> (StatusCode, Json<Value>) {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let path = uri.path().trim_start_matches("/wd/hub").to_string();

    let mut state = state.lock().unwrap();
    state.calls.push(RecordedCall {
        method: method.to_string(),
        path: path.clone(),
        body: body.clone(),
    });
    let config = &state.config;
    let protocol = config.protocol;

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("POST", ["session"]) => {
            if config.reject_session {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "value": { "error": "session not created", "message": "no device" } })),
                );
            }
            let granted = body["capabilities"]["alwaysMatch"].clone();
            match protocol {
                Protocol::W3c => success(
                    protocol,
                    json!({ "sessionId": MOCK_SESSION_ID, "capabilities": granted }),
                ),
                Protocol::Legacy => success(protocol, body["desiredCapabilities"].clone()),
            }
        }
        (_, ["session", id, ..]) if *id != MOCK_SESSION_ID => {
            failure(protocol, "invalid session id", 6, "unknown session")
        }
        ("DELETE", ["session", _]) => success(protocol, Value::Null),
        ("POST", ["session", _, "elements"]) => {
            let query = body["value"].as_str().unwrap_or_default();
            let ids = config.elements.get(query).cloned().unwrap_or_default();
            let refs: Vec<Value> = ids.iter().map(|id| element_ref(protocol, id)).collect();
            success(protocol, Value::Array(refs))
        }
        ("POST", ["session", _, "element", eid, "click"]) => {
            if config.stale.contains(*eid) {
                failure(protocol, "stale element reference", 10, "element is not attached")
            } else {
                success(protocol, Value::Null)
            }
        }
        ("GET", ["session", _, "element", eid, "text"]) => match config.texts.get(*eid) {
            Some(text) => success(protocol, json!(text)),
            None => failure(protocol, "no such element", 7, "unknown element"),
        },
        ("POST", ["session", _, "timeouts"])
        | ("POST", ["session", _, "back"])
        | ("POST", ["session", _, "appium", "app", "background"])
        | ("POST", ["session", _, "appium", "device", "start_activity"])
        | ("POST", ["session", _, "execute", "sync"]) => success(protocol, Value::Null),
        _ => failure(protocol, "unknown command", 9, "unsupported"),
    }
}
