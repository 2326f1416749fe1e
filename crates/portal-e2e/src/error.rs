//! Error types for portal E2E runs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Driver error ({kind}): {message}")]
    Driver { kind: String, message: String },

    #[error("Locator {0} resolved to no element")]
    LocatorNotFound(String),

    #[error("Locator {locator} is ambiguous: resolved to {count} elements")]
    LocatorAmbiguous { locator: String, count: usize },

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Target unreachable after {attempts} attempt(s): {reason}")]
    Preflight { attempts: usize, reason: String },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl E2eError {
    /// Whether this error came from a locator that did not resolve to exactly one element
    pub fn is_locator_error(&self) -> bool {
        matches!(
            self,
            E2eError::LocatorNotFound(_) | E2eError::LocatorAmbiguous { .. }
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
