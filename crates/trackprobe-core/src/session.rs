//! Driver handle lifecycle: bootstrap and teardown.
//!
//! A [`DriverHandle`] is the run-scoped owner of the single live automation
//! session. It is created by [`DriverHandle::bootstrap`], passed by reference
//! into every scenario, and released exactly once by
//! [`DriverHandle::release`]. Releasing is idempotent: a second release, or a
//! release of a handle that never held a session, does nothing.
//!
//! How a session is obtained is abstracted behind [`Connector`], so the same
//! bootstrap logic runs against a real Appium endpoint ([`AppiumConnector`])
//! or an in-memory driver in tests.
//!
//! # Example
//!
//! ```no_run
//! use trackprobe_core::config::Profile;
//! use trackprobe_core::session::{AppiumConnector, DriverHandle};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut handle = DriverHandle::bootstrap(&AppiumConnector, &Profile::local_emulator()).await?;
//! println!("session {:?}", handle.session_id());
//! handle.release().await?;
//! handle.release().await?; // no-op
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::appium_client::AppiumClient;
use crate::appium_driver::AppiumDriver;
use crate::capabilities::Capabilities;
use crate::config::Profile;
use crate::driver::{DriverError, MobileDriver};
use crate::error::RunError;

/// Opens automation sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Negotiates a new session for `profile` using `capabilities`.
    ///
    /// Any failure is a [`RunError::SessionStartFailure`].
    async fn connect(
        &self,
        profile: &Profile,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn MobileDriver>, RunError>;
}

/// [`Connector`] that talks to the profile's Appium endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppiumConnector;

#[async_trait]
impl Connector for AppiumConnector {
    async fn connect(
        &self,
        profile: &Profile,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn MobileDriver>, RunError> {
        let client = AppiumClient::new(profile.server_url.clone(), profile.command_timeout())
            .map_err(|e| RunError::SessionStartFailure(e.to_string()))?;
        let driver = AppiumDriver::start(client, capabilities)
            .await
            .map_err(|e| RunError::SessionStartFailure(e.to_string()))?;
        Ok(Arc::new(driver))
    }
}

/// Run-scoped owner of the live automation session.
pub struct DriverHandle {
    driver: Option<Arc<dyn MobileDriver>>,
}

impl DriverHandle {
    /// A handle that never held a session.
    pub fn empty() -> Self {
        Self { driver: None }
    }

    /// Wraps an already-started driver.
    pub fn from_driver(driver: Arc<dyn MobileDriver>) -> Self {
        Self {
            driver: Some(driver),
        }
    }

    /// Starts a session for `profile` and prepares it for scenarios.
    ///
    /// Applies the profile's implicit wait and, when the profile names a
    /// launch activity, starts it. If either fails, the new session is quit
    /// before the error is returned.
    pub async fn bootstrap(connector: &dyn Connector, profile: &Profile) -> Result<Self, RunError> {
        profile
            .validate()
            .map_err(|e| RunError::SessionStartFailure(e.to_string()))?;

        let capabilities = profile.capabilities();
        debug!(count = capabilities.len(), endpoint = %profile.server_url, "requesting session");
        let driver = connector.connect(profile, &capabilities).await?;
        let mut handle = Self::from_driver(Arc::clone(&driver));

        if let Err(e) = Self::prepare(driver.as_ref(), profile).await {
            if let Err(release_err) = handle.release().await {
                warn!(error = %release_err, "cannot release session after failed bootstrap");
            }
            return Err(RunError::SessionStartFailure(e.to_string()));
        }

        info!(session_id = driver.session_id(), "session ready");
        Ok(handle)
    }

    async fn prepare(driver: &dyn MobileDriver, profile: &Profile) -> Result<(), DriverError> {
        driver.set_implicit_wait(profile.implicit_wait()).await?;
        if let Some(activity) = &profile.launch_activity {
            let package = profile.app_package.as_deref().ok_or_else(|| {
                DriverError::CommandFailed("launch_activity requires app_package".to_string())
            })?;
            driver.start_activity(package, activity).await?;
        }
        Ok(())
    }

    /// Returns true while the handle holds a session.
    pub fn is_live(&self) -> bool {
        self.driver.is_some()
    }

    /// The live driver, or [`DriverError::SessionClosed`] after release.
    pub fn driver(&self) -> Result<&dyn MobileDriver, DriverError> {
        self.driver.as_deref().ok_or(DriverError::SessionClosed)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.driver.as_deref().map(|d| d.session_id())
    }

    /// Quits the session if one is held.
    ///
    /// The handle is released even when the quit command fails; the failure
    /// is reported as [`RunError::Teardown`].
    pub async fn release(&mut self) -> Result<(), RunError> {
        let Some(driver) = self.driver.take() else {
            debug!("release on empty handle");
            return Ok(());
        };
        match driver.quit().await {
            Ok(()) => {
                info!(session_id = driver.session_id(), "session released");
                Ok(())
            }
            Err(DriverError::SessionClosed) => {
                debug!(session_id = driver.session_id(), "session already closed");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = driver.session_id(), error = %e, "session quit failed");
                Err(RunError::Teardown(e.to_string()))
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if let Some(driver) = &self.driver {
            warn!(session_id = driver.session_id(), "driver handle dropped without release");
        }
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("session_id", &self.session_id())
            .finish()
    }
}
