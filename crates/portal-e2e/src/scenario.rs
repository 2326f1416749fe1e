//! The portal login scenario and step execution
//!
//! [`login_scenario`] builds the canonical procedure: open the landing page,
//! dismiss the consent dialog when it shows up, fill the identifier and
//! secret, submit, and check the oracle once the network settles.
//! [`execute_step`] runs any [`TestStep`] against a [`PageDriver`].

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PortalConfig;
use crate::credentials::Credentials;
use crate::driver::{probe_visible, LoadState, PageDriver};
use crate::error::E2eResult;
use crate::locator::Locator;
use crate::oracle::{Oracle, OracleOutcome};
use crate::spec::{CredentialField, FillValue, TestSpec, TestStep, Viewport};

pub const LOGIN_SCENARIO_NAME: &str = "portal-login";

/// Locators for the login form; each can be overridden under `[selectors]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    /// Optional consent dialog button
    pub consent: Locator,
    pub identifier: Locator,
    pub secret: Locator,
    pub submit: Locator,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            consent: Locator::role("button", "agree").exact(),
            identifier: Locator::placeholder("username or id number"),
            secret: Locator::placeholder("password").exact(),
            submit: Locator::role("button", "log in").exact(),
        }
    }
}

impl LoginSelectors {
    /// Labelled locators, in the order the scenario uses them
    pub fn labelled(&self) -> [(&'static str, &Locator); 4] {
        [
            ("consent", &self.consent),
            ("identifier", &self.identifier),
            ("secret", &self.secret),
            ("submit", &self.submit),
        ]
    }
}

/// Build the login procedure from configuration
pub fn login_scenario(config: &PortalConfig) -> TestSpec {
    let selectors = &config.selectors;
    TestSpec {
        name: LOGIN_SCENARIO_NAME.to_string(),
        description: "Log in from the public landing page and leave it".to_string(),
        tags: vec!["auth".to_string(), "login".to_string()],
        viewport: Some(Viewport {
            width: config.use_options.viewport_width,
            height: config.use_options.viewport_height,
        }),
        steps: vec![
            TestStep::Navigate {
                url: Some(config.target.url.clone()),
                wait_until: LoadState::NetworkIdle,
            },
            TestStep::ClickIfVisible {
                locator: selectors.consent.clone(),
                probe_ms: Some(config.use_options.consent_probe_ms),
            },
            TestStep::Fill {
                locator: selectors.identifier.clone(),
                value: FillValue::Credential {
                    credential: CredentialField::Identifier,
                },
            },
            TestStep::Fill {
                locator: selectors.secret.clone(),
                value: FillValue::Credential {
                    credential: CredentialField::Secret,
                },
            },
            TestStep::Click {
                locator: selectors.submit.clone(),
            },
            TestStep::WaitForLoadState {
                state: LoadState::NetworkIdle,
            },
            TestStep::Assert {
                oracle: Some(config.effective_oracle()),
            },
        ],
    }
}

/// Everything a step needs besides the page
#[derive(Debug, Clone)]
pub struct StepContext {
    pub target_url: String,
    pub credentials: Credentials,
    pub oracle: Oracle,
    pub consent_probe: Duration,
    pub screenshot_dir: PathBuf,
}

impl StepContext {
    pub fn from_config(config: &PortalConfig, credentials: Credentials) -> Self {
        Self {
            target_url: config.target.url.clone(),
            credentials,
            oracle: config.effective_oracle(),
            consent_probe: Duration::from_millis(config.use_options.consent_probe_ms),
            screenshot_dir: config.runner.output_dir.join("screenshots"),
        }
    }

    fn resolve(&self, value: &FillValue) -> String {
        match value {
            FillValue::Credential {
                credential: CredentialField::Identifier,
            } => self.credentials.identifier().to_string(),
            FillValue::Credential {
                credential: CredentialField::Secret,
            } => self.credentials.secret().to_string(),
            FillValue::Literal(value) => value.clone(),
        }
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,

    /// Set by `click_if_visible`: whether the element was there and clicked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicked: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct StepOutput {
    clicked: Option<bool>,
    oracle: Option<OracleOutcome>,
    screenshot_path: Option<PathBuf>,
}

/// Execute a single step; failures are reported in the result, not as `Err`
pub async fn execute_step(
    driver: &mut dyn PageDriver,
    step: &TestStep,
    ctx: &StepContext,
) -> StepResult {
    let start = Instant::now();
    let step_name = step.name();

    debug!("Executing step: {}", step_name);

    let result = run_step(driver, step, ctx).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(output) => StepResult {
            success: true,
            step_name,
            duration_ms,
            error: None,
            clicked: output.clicked,
            oracle: output.oracle,
            screenshot_path: output.screenshot_path,
        },
        Err(e) => {
            if e.is_locator_error() {
                warn!("{}: {} (audit the page with --inventory)", step_name, e);
            }
            StepResult {
                success: false,
                step_name,
                duration_ms,
                error: Some(e.to_string()),
                clicked: None,
                oracle: None,
                screenshot_path: None,
            }
        }
    }
}

async fn run_step(
    driver: &mut dyn PageDriver,
    step: &TestStep,
    ctx: &StepContext,
) -> E2eResult<StepOutput> {
    let mut output = StepOutput::default();

    match step {
        TestStep::Navigate { url, wait_until } => {
            let url = url.as_deref().unwrap_or(&ctx.target_url);
            driver.goto(url, *wait_until).await?;
        }
        TestStep::WaitForLoadState { state } => {
            driver.wait_for_load_state(*state).await?;
        }
        TestStep::Click { locator } => {
            driver.click(locator).await?;
        }
        TestStep::ClickIfVisible { locator, probe_ms } => {
            let within = probe_ms
                .map(Duration::from_millis)
                .unwrap_or(ctx.consent_probe);
            let visible = probe_visible(driver, locator, within).await;
            if visible {
                info!("Dismissing {}", locator);
                driver.click(locator).await?;
            } else {
                debug!("{} not present, skipping", locator);
            }
            output.clicked = Some(visible);
        }
        TestStep::Fill { locator, value } => {
            driver.fill(locator, &ctx.resolve(value)).await?;
        }
        TestStep::Assert { oracle } => {
            let oracle = oracle.as_ref().unwrap_or(&ctx.oracle);
            output.oracle = Some(oracle.assert(driver).await?);
        }
        TestStep::Screenshot { name } => {
            std::fs::create_dir_all(&ctx.screenshot_dir)?;
            let path = ctx.screenshot_dir.join(format!("{}.png", name));
            driver.screenshot(&path).await?;
            output.screenshot_path = Some(path);
        }
        TestStep::Log { message } => {
            info!("[TEST LOG] {}", message);
        }
    }

    Ok(output)
}
