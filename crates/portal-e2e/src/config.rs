//! Runner configuration (`e2e.toml`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::artifacts::VideoMode;
use crate::credentials::CredentialsConfig;
use crate::error::{E2eError, E2eResult};
use crate::oracle::{Oracle, DEFAULT_LANDING_PATTERN};
use crate::playwright::Browser;
use crate::preflight::PreflightMode;
use crate::scenario::LoginSelectors;

/// Public landing page of the portal
pub const DEFAULT_TARGET_URL: &str = "https://digital.gov.eg/homepublic";

/// Config file read when `--config` is not given; the only one allowed to be missing
pub const DEFAULT_CONFIG_FILE: &str = "e2e.toml";

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Browser execution options
    #[serde(rename = "use")]
    pub use_options: UseOptions,

    /// Portal under test
    pub target: TargetConfig,

    pub credentials: CredentialsConfig,

    /// Locator overrides for the login form
    pub selectors: LoginSelectors,

    /// Overrides the URL oracle derived from `target.landing_pattern`
    pub oracle: Option<Oracle>,

    pub runner: RunnerOptions,
}

/// `[use]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UseOptions {
    /// Run without a visible browser window
    pub headless: bool,

    /// Video capture per scenario
    pub video: VideoMode,

    pub browser: Browser,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Default timeout for clicks, fills and load-state waits
    pub action_timeout_ms: u64,

    pub navigation_timeout_ms: u64,

    /// Bound on the optional consent-button check
    pub consent_probe_ms: u64,
}

impl Default for UseOptions {
    fn default() -> Self {
        Self {
            headless: true,
            video: VideoMode::Off,
            browser: Browser::Chromium,
            viewport_width: 1280,
            viewport_height: 720,
            action_timeout_ms: 30_000,
            navigation_timeout_ms: 30_000,
            consent_probe_ms: 2_000,
        }
    }
}

/// `[target]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,

    /// Route fragment that identifies the pre-login page
    pub landing_pattern: String,

    /// HTTP probe of the URL before launching a browser
    pub preflight: PreflightMode,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TARGET_URL.to_string(),
            landing_pattern: DEFAULT_LANDING_PATTERN.to_string(),
            preflight: PreflightMode::Warn,
        }
    }
}

/// `[runner]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Directory of YAML scenarios run alongside the built-in login scenario
    pub specs_dir: PathBuf,

    pub output_dir: PathBuf,

    /// Scenarios run concurrently, each in its own browser
    pub workers: usize,

    /// `node_modules` directory that provides `playwright`
    pub node_modules: PathBuf,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            specs_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
            workers: 1,
            node_modules: PathBuf::from("node_modules"),
        }
    }
}

impl PortalConfig {
    /// Load configuration from file
    ///
    /// Only a missing [`DEFAULT_CONFIG_FILE`] falls back to defaults; any other
    /// missing path is an error.
    pub fn load(path: &Path) -> E2eResult<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else if path == Path::new(DEFAULT_CONFIG_FILE) {
            debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
            Self::default()
        } else {
            return Err(E2eError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        };
        config.validate()?;
        Ok(config)
    }

    /// The oracle a scenario asserts when it does not name one
    pub fn effective_oracle(&self) -> Oracle {
        self.oracle.clone().unwrap_or_else(|| Oracle::UrlNotMatching {
            pattern: self.target.landing_pattern.clone(),
        })
    }

    pub fn validate(&self) -> E2eResult<()> {
        reqwest::Url::parse(&self.target.url).map_err(|e| {
            E2eError::Config(format!("target.url '{}' is invalid: {}", self.target.url, e))
        })?;
        if self.runner.workers == 0 {
            return Err(E2eError::Config("runner.workers must be at least 1".into()));
        }
        if self.use_options.viewport_width == 0 || self.use_options.viewport_height == 0 {
            return Err(E2eError::Config("viewport dimensions must be non-zero".into()));
        }
        self.effective_oracle().validate()
    }
}
