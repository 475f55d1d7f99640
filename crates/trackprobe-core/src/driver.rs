//! Driver trait for backend-agnostic mobile UI automation.
//!
//! This module defines the [`MobileDriver`] trait, the operations a scenario
//! needs from a live automation session: locating elements, tapping them,
//! platform back, backgrounding and restarting the app, and quitting the
//! session. [`AppiumDriver`](crate::appium_driver::AppiumDriver) implements it
//! over HTTP; tests implement it in memory.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{Element, Located, Locator};

/// Errors that can occur during driver operations.
///
/// This enum unifies wire-level failures behind a single type so the runner
/// can classify them without knowing the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The session was quit or the endpoint no longer knows it.
    #[error("session closed")]
    SessionClosed,

    /// No element matched a locator.
    #[error("no such element: {0}")]
    NoSuchElement(String),

    /// The element reference is no longer attached to the screen.
    #[error("stale element reference: {0}")]
    StaleElement(String),

    /// The endpoint rejected or failed a command.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The endpoint could not be reached or the request timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with something that is not a valid response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait for mobile UI automation backends.
///
/// All device interactions are async. A driver represents exactly one remote
/// session; after [`quit`](MobileDriver::quit) every further call should fail
/// with [`DriverError::SessionClosed`].
///
/// # Required Methods
///
/// Implementors must provide everything except [`locate`](MobileDriver::locate)
/// and [`restart_app`](MobileDriver::restart_app), which are composed from the
/// other operations.
#[async_trait]
pub trait MobileDriver: Send + Sync {
    /// The remote session id.
    fn session_id(&self) -> &str;

    /// Applies the implicit per-element wait for all later lookups.
    async fn set_implicit_wait(&self, wait: Duration) -> Result<(), DriverError>;

    /// Returns every element matching `locator`, in document order.
    ///
    /// An empty list means nothing matched within the implicit wait.
    async fn find_elements(&self, locator: &Locator) -> Result<Vec<Element>, DriverError>;

    /// Locates `locator` and classifies the result.
    async fn locate(&self, locator: &Locator) -> Result<Located, DriverError> {
        let matches = self.find_elements(locator).await?;
        Ok(Located::from_matches(matches))
    }

    /// Taps an element.
    async fn click(&self, element: &Element) -> Result<(), DriverError>;

    /// Reads an element's visible text.
    async fn element_text(&self, element: &Element) -> Result<String, DriverError>;

    /// Performs the platform back action.
    async fn back(&self) -> Result<(), DriverError>;

    /// Sends the app to the background for `duration`, then restores it.
    ///
    /// Resolves once the app is in the foreground again.
    async fn background_app(&self, duration: Duration) -> Result<(), DriverError>;

    /// Kills the app under test.
    async fn terminate_app(&self) -> Result<(), DriverError>;

    /// Brings the app under test to the foreground, launching it if needed.
    async fn activate_app(&self) -> Result<(), DriverError>;

    /// Kills the app and launches it again within the same session.
    async fn restart_app(&self) -> Result<(), DriverError> {
        self.terminate_app().await?;
        self.activate_app().await
    }

    /// Starts an activity by package and name.
    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), DriverError>;

    /// Ends the remote session.
    async fn quit(&self) -> Result<(), DriverError>;
}
