//! # trackprobe-core
//!
//! Core library for driving the Application Insights Android sample app through
//! a remote Appium endpoint and exercising its telemetry features (event
//! tracking, page views, session management, synchronization, crash handling).
//!
//! ## Modules
//!
//! - [`capabilities`] - Immutable capability descriptor for new-session requests
//! - [`config`] - Named session profiles (local emulator, device grid, CI)
//! - [`driver`] - The [`MobileDriver`](driver::MobileDriver) trait and its error type
//! - [`appium_client`] - HTTP/JSON transport for the WebDriver wire protocol
//! - [`appium_driver`] - [`MobileDriver`](driver::MobileDriver) backed by an Appium session
//! - [`element`] - Remote element references and locate results
//! - [`step`] - Scenario steps and their log entries
//! - [`journal`] - In-memory and JSON Lines step journal
//! - [`session`] - Driver handle bootstrap and teardown
//! - [`runner`] - Sequential scenario execution and suite orchestration
//! - [`catalog`] - The fixed toggle scenario catalog
//! - [`report`] - Per-scenario outcomes and the aggregate suite report
//! - [`error`] - Run-level error taxonomy
//!
//! ## Example
//!
//! ```no_run
//! use trackprobe_core::catalog::Catalog;
//! use trackprobe_core::config::TrackprobeConfig;
//! use trackprobe_core::runner::run_suite;
//! use trackprobe_core::session::AppiumConnector;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrackprobeConfig::load()?;
//! let profile = config.profile("local-emulator")?;
//! let report = run_suite(&AppiumConnector, &profile, &Catalog::telemetry(), None).await?;
//! println!("{} of {} scenarios passed", report.passed(), report.outcomes.len());
//! # Ok(())
//! # }
//! ```

pub mod appium_client;
pub mod appium_driver;
pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod element;
pub mod error;
pub mod journal;
pub mod report;
pub mod runner;
pub mod session;
pub mod step;
