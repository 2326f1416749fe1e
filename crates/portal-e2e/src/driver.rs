//! Browser page abstraction
//!
//! Scenarios talk to a [`PageDriver`]; the Playwright bridge is the production
//! implementation. One driver is one isolated session (browser, context and
//! page) owned by a single scenario.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::E2eResult;
use crate::inventory::ControlItem;
use crate::locator::Locator;
use crate::spec::Viewport;

/// Page load milestone to wait for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[default]
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Operations a scenario performs on its page
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate and wait for `wait_until`
    async fn goto(&mut self, url: &str, wait_until: LoadState) -> E2eResult<()>;

    async fn wait_for_load_state(&mut self, state: LoadState) -> E2eResult<()>;

    /// Immediate visibility check; an ambiguous locator is an error
    async fn is_visible(&mut self, locator: &Locator) -> E2eResult<bool>;

    /// Click the single element `locator` resolves to
    async fn click(&mut self, locator: &Locator) -> E2eResult<()>;

    /// Assign `value` to the single input `locator` resolves to
    async fn fill(&mut self, locator: &Locator, value: &str) -> E2eResult<()>;

    async fn url(&mut self) -> E2eResult<String>;

    async fn content(&mut self) -> E2eResult<String>;

    /// Every control matching the inventory selector, all attributes included
    async fn controls(&mut self) -> E2eResult<Vec<ControlItem>>;

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()>;

    /// Release the session; returns the recorded video, if any
    async fn close(&mut self) -> E2eResult<Option<PathBuf>>;
}

/// Opens isolated sessions
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// `viewport` overrides the factory default for this session only
    async fn launch(
        &self,
        session: &str,
        viewport: Option<Viewport>,
    ) -> E2eResult<Box<dyn PageDriver>>;
}

/// Optional-presence check: any error or timeout counts as "not visible"
pub async fn probe_visible(
    driver: &mut dyn PageDriver,
    locator: &Locator,
    within: Duration,
) -> bool {
    match tokio::time::timeout(within, driver.is_visible(locator)).await {
        Ok(Ok(visible)) => visible,
        Ok(Err(e)) => {
            debug!("Visibility probe for {} failed, treating as absent: {}", locator, e);
            false
        }
        Err(_) => {
            debug!("Visibility probe for {} timed out after {:?}", locator, within);
            false
        }
    }
}
