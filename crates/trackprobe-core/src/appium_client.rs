//! Async HTTP client for the WebDriver wire protocol spoken by Appium.
//!
//! This module provides [`AppiumClient`], a low-level transport that sends
//! JSON commands to an automation endpoint and unwraps the `{"value": ...}`
//! response envelope. Both W3C error envelopes (`value.error`) and legacy
//! JSON Wire Protocol envelopes (numeric `status`) are understood, because
//! device-lab gateways still speak the older dialect.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use trackprobe_core::appium_client::AppiumClient;
//! use trackprobe_core::capabilities::Capabilities;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AppiumClient::new("http://127.0.0.1:4723/wd/hub", Duration::from_secs(60))?;
//! let caps = Capabilities::builder().platform_name("Android").build();
//! let session = client.new_session(&caps).await?;
//! client.delete(&format!("/session/{}", session.session_id)).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, debug_span, trace, Instrument};

use crate::capabilities::Capabilities;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Timeout for establishing a TCP connection to the endpoint.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the automation endpoint.
#[derive(Error, Debug)]
pub enum AppiumClientError {
    /// The request could not be sent or the response could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status and no WebDriver error.
    #[error("unexpected HTTP status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Raw response body.
        body: String,
    },

    /// The endpoint reported a WebDriver error.
    #[error("{error}: {message}")]
    Remote {
        /// WebDriver error code, e.g. `no such element`.
        error: String,
        /// Human-readable message from the endpoint.
        message: String,
    },

    /// The response body was not valid JSON.
    #[error("cannot decode response: {0}")]
    Decode(String),

    /// A new-session response carried no session id.
    #[error("new session response has no session id")]
    MissingSessionId,
}

impl AppiumClientError {
    /// The WebDriver error code, when the endpoint reported one.
    pub fn remote_error(&self) -> Option<&str> {
        match self {
            AppiumClientError::Remote { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope decoding
// ---------------------------------------------------------------------------

/// Maps a legacy JSON Wire Protocol status code to its W3C error name.
fn legacy_error_name(status: i64) -> &'static str {
    match status {
        6 => "invalid session id",
        7 => "no such element",
        10 => "stale element reference",
        11 => "element not interactable",
        21 => "timeout",
        33 => "session not created",
        _ => "unknown error",
    }
}

fn message_of(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decodes a response body into its `value` payload.
///
/// Returns the full envelope's `value` (or `null` when absent) on success.
pub fn decode_envelope(status: u16, body: &str) -> Result<Value, AppiumClientError> {
    let success = (200..300).contains(&status);

    let envelope: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if success && body.trim().is_empty() => {
            trace!(error = %e, "empty response body");
            return Ok(Value::Null);
        }
        Err(e) if success => return Err(AppiumClientError::Decode(e.to_string())),
        Err(_) => {
            return Err(AppiumClientError::Status {
                code: status,
                body: body.to_string(),
            })
        }
    };

    let value = envelope.get("value").cloned().unwrap_or(Value::Null);

    if let Some(code) = envelope.get("status").and_then(Value::as_i64) {
        if code != 0 {
            return Err(AppiumClientError::Remote {
                error: legacy_error_name(code).to_string(),
                message: message_of(&value),
            });
        }
    }

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(AppiumClientError::Remote {
            error: error.to_string(),
            message: message_of(&value),
        });
    }

    if !success {
        return Err(AppiumClientError::Status {
            code: status,
            body: body.to_string(),
        });
    }

    Ok(envelope_with_session(envelope, value))
}

/// Legacy new-session responses put `sessionId` next to `value`; fold it in so
/// callers only look in one place.
fn envelope_with_session(envelope: Value, mut value: Value) -> Value {
    if let (Some(id), Value::Object(map)) = (envelope.get("sessionId"), &mut value) {
        if !id.is_null() {
            map.entry("sessionId").or_insert_with(|| id.clone());
        }
    }
    value
}

// ---------------------------------------------------------------------------
// AppiumClient
// ---------------------------------------------------------------------------

/// Result of a successful new-session request.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// The session id to address later commands to.
    pub session_id: String,
    /// Capabilities the endpoint actually granted.
    pub capabilities: Value,
}

/// Async client for an Appium endpoint.
///
/// Stateless apart from the endpoint URL: session ids are passed in the
/// request path, so one client can serve any number of sessions.
#[derive(Debug, Clone)]
pub struct AppiumClient {
    http: Client,
    base_url: String,
}

impl AppiumClient {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, command_timeout: Duration) -> Result<Self, AppiumClientError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(command_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The endpoint URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Negotiates a new session.
    pub async fn new_session(&self, capabilities: &Capabilities) -> Result<NewSession, AppiumClientError> {
        let value = self.post("/session", &capabilities.new_session_body()).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or(AppiumClientError::MissingSessionId)?
            .to_string();
        let granted = value
            .get("capabilities")
            .cloned()
            .unwrap_or_else(|| value.clone());
        debug!(session_id = %session_id, "session created");
        Ok(NewSession {
            session_id,
            capabilities: granted,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Value, AppiumClientError> {
        self.send("GET", path, self.http.get(self.url(path))).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, AppiumClientError> {
        self.send("POST", path, self.http.post(self.url(path)).json(body)).await
    }

    /// Like [`post`](Self::post) with a request-specific timeout, for commands
    /// that block on the device for a known duration.
    pub async fn post_with_timeout(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, AppiumClientError> {
        let request = self.http.post(self.url(path)).json(body).timeout(timeout);
        self.send("POST", path, request).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, AppiumClientError> {
        self.send("DELETE", path, self.http.delete(self.url(path))).await
    }

    async fn send(&self, method: &'static str, path: &str, request: RequestBuilder) -> Result<Value, AppiumClientError> {
        let span = debug_span!("webdriver", method, path);
        async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            trace!(status, len = body.len(), "response received");
            decode_envelope(status, &body)
        }
        .instrument(span)
        .await
    }
}
