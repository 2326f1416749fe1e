//! Pass/fail conditions evaluated at the end of a scenario

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

/// Landing route fragment; still matching it after submit means the login failed
pub const DEFAULT_LANDING_PATTERN: &str = "homepublic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Oracle {
    /// Current URL must not match `pattern` (case-insensitive)
    UrlNotMatching { pattern: String },

    /// Current URL must match `pattern` (case-insensitive)
    UrlMatching { pattern: String },

    /// `locator` must be visible on the current page
    ElementVisible { locator: Locator },
}

impl Default for Oracle {
    fn default() -> Self {
        Oracle::UrlNotMatching {
            pattern: DEFAULT_LANDING_PATTERN.to_string(),
        }
    }
}

/// What the oracle saw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleOutcome {
    pub passed: bool,
    pub observed: String,
}

fn compile(pattern: &str) -> E2eResult<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

impl Oracle {
    /// Reject patterns that will not compile
    pub fn validate(&self) -> E2eResult<()> {
        match self {
            Oracle::UrlNotMatching { pattern } | Oracle::UrlMatching { pattern } => {
                compile(pattern).map(|_| ())
            }
            Oracle::ElementVisible { .. } => Ok(()),
        }
    }

    /// Check a URL without touching a browser
    pub fn check_url(&self, url: &str) -> E2eResult<Option<bool>> {
        match self {
            Oracle::UrlNotMatching { pattern } => Ok(Some(!compile(pattern)?.is_match(url))),
            Oracle::UrlMatching { pattern } => Ok(Some(compile(pattern)?.is_match(url))),
            Oracle::ElementVisible { .. } => Ok(None),
        }
    }

    pub async fn evaluate(&self, driver: &mut dyn PageDriver) -> E2eResult<OracleOutcome> {
        match self {
            Oracle::UrlNotMatching { .. } | Oracle::UrlMatching { .. } => {
                let url = driver.url().await?;
                let passed = self.check_url(&url)?.unwrap_or(false);
                Ok(OracleOutcome {
                    passed,
                    observed: url,
                })
            }
            Oracle::ElementVisible { locator } => {
                let visible = driver.is_visible(locator).await?;
                Ok(OracleOutcome {
                    passed: visible,
                    observed: if visible { "visible" } else { "not visible" }.to_string(),
                })
            }
        }
    }

    /// Evaluate and turn a failing outcome into [`E2eError::AssertionFailed`]
    pub async fn assert(&self, driver: &mut dyn PageDriver) -> E2eResult<OracleOutcome> {
        let outcome = self.evaluate(driver).await?;
        if outcome.passed {
            Ok(outcome)
        } else {
            Err(E2eError::AssertionFailed(format!(
                "expected {}, observed {}",
                self, outcome.observed
            )))
        }
    }
}

impl fmt::Display for Oracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Oracle::UrlNotMatching { pattern } => write!(f, "URL not matching /{}/i", pattern),
            Oracle::UrlMatching { pattern } => write!(f, "URL matching /{}/i", pattern),
            Oracle::ElementVisible { locator } => write!(f, "{} to be visible", locator),
        }
    }
}
