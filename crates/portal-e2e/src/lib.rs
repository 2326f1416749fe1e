//! Portal E2E Login Checks
//!
//! This crate drives a real browser through the login form of the public
//! government portal and reports whether the login left the landing page:
//! - Runs the login scenario and any YAML scenarios through Playwright
//! - Keeps locator matching, the pass/fail oracle and credentials in Rust
//! - Records per-scenario videos and failure screenshots
//! - Captures a control inventory of a page to audit locators against
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  E2E Test Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── check_reachable(target) -> PreflightReport           │
//! │    ├── factory.launch(scenario) -> Box<dyn PageDriver>      │
//! │    ├── execute_step(driver, step) -> StepResult             │
//! │    └── settle_video(mode, passed) -> Option<Artifact>       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaywrightDriver  ── JSON lines ──▶  node driver.js        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSpec (built-in login scenario or YAML)                 │
//! │    ├── navigate { url?, wait_until }                        │
//! │    ├── click_if_visible { locator, probe_ms? }              │
//! │    ├── fill { locator, value | credential }                 │
//! │    ├── click { locator }                                    │
//! │    ├── wait_for_load_state { state }                        │
//! │    └── assert { oracle? }                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifacts;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod inventory;
pub mod locator;
pub mod oracle;
pub mod playwright;
pub mod preflight;
pub mod runner;
pub mod scenario;
pub mod spec;

pub use config::PortalConfig;
pub use credentials::Credentials;
pub use driver::{DriverFactory, LoadState, PageDriver};
pub use error::{E2eError, E2eResult};
pub use locator::Locator;
pub use oracle::Oracle;
pub use runner::TestRunner;
pub use scenario::{login_scenario, LoginSelectors};
pub use spec::{TestSpec, TestStep};
