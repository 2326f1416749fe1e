//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::driver::LoadState;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::oracle::Oracle;

/// A complete scenario parsed from YAML or built in code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Which credential a fill step draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialField {
    Identifier,
    Secret,
}

/// Value assigned by a fill step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Credential { credential: CredentialField },
    Literal(String),
}

impl FillValue {
    /// Safe to log: literals are shown, credentials only by field
    pub fn describe(&self) -> String {
        match self {
            FillValue::Credential {
                credential: CredentialField::Identifier,
            } => "<identifier>".to_string(),
            FillValue::Credential {
                credential: CredentialField::Secret,
            } => "<secret>".to_string(),
            FillValue::Literal(value) => format!("{:?}", value),
        }
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL; the configured target when absent
    Navigate {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        wait_until: LoadState,
    },

    /// Wait for a page load milestone
    WaitForLoadState {
        #[serde(default)]
        state: LoadState,
    },

    /// Click an element
    Click { locator: Locator },

    /// Click an element only if it is visible within a short probe
    ClickIfVisible {
        locator: Locator,
        #[serde(default)]
        probe_ms: Option<u64>,
    },

    /// Fill an input field
    Fill { locator: Locator, value: FillValue },

    /// Evaluate an oracle; the configured one when absent
    Assert {
        #[serde(default)]
        oracle: Option<Oracle>,
    },

    /// Take a screenshot into the output directory
    Screenshot { name: String },

    /// Log a message (for debugging)
    Log { message: String },
}

impl TestStep {
    /// Short label used in logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, wait_until } => format!(
                "navigate:{}:{}",
                url.as_deref().unwrap_or("<target>"),
                wait_until.as_str()
            ),
            TestStep::WaitForLoadState { state } => format!("wait:{}", state.as_str()),
            TestStep::Click { locator } => format!("click:{}", locator),
            TestStep::ClickIfVisible { locator, .. } => format!("click-if-visible:{}", locator),
            TestStep::Fill { locator, value } => format!("fill:{}={}", locator, value.describe()),
            TestStep::Assert { oracle: Some(oracle) } => format!("assert:{}", oracle),
            TestStep::Assert { oracle: None } => "assert:<configured oracle>".to_string(),
            TestStep::Screenshot { name } => format!("screenshot:{}", name),
            TestStep::Log { message } => {
                let short: String = message.chars().take(30).collect();
                format!("log:{}", short)
            }
        }
    }
}

impl TestSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::SpecParse(msg) => E2eError::SpecParse(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Load all scenarios from a directory
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        for path in paths {
            specs.push(Self::from_file(&path)?);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("scenario '{}' has no steps", self.name)));
        }
        for step in &self.steps {
            if let TestStep::Assert { oracle: Some(oracle) } = step {
                oracle.validate()?;
            }
        }
        Ok(())
    }
}
