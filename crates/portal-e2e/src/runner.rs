//! Main test runner that orchestrates sessions, scenarios and artifacts

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::artifacts::{sanitize, settle_video, Artifact, VideoMode};
use crate::config::PortalConfig;
use crate::credentials::Credentials;
use crate::driver::{DriverFactory, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::preflight::{check_reachable, PreflightConfig, PreflightMode};
use crate::scenario::{execute_step, login_scenario, StepContext, StepResult};
use crate::spec::TestSpec;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Artifact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_screenshot: Option<PathBuf>,
}

impl TestResult {
    fn failed_before_start(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            steps: vec![],
            error: Some(error),
            video: None,
            failure_screenshot: None,
        }
    }

    /// The step that failed, if any
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(started_at: DateTime<Utc>, duration_ms: u64, results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            skipped: 0,
            duration_ms,
            results,
        }
    }

    /// 0 when every scenario passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: PortalConfig,
    credentials: Credentials,
    factory: Arc<dyn DriverFactory>,
    preflight: Option<PreflightConfig>,
}

impl TestRunner {
    /// Create a runner; the preflight probe follows `target.preflight`
    pub fn new(config: PortalConfig, credentials: Credentials, factory: Arc<dyn DriverFactory>) -> Self {
        let preflight = config.target.preflight.enabled().then(PreflightConfig::default);
        Self {
            config,
            credentials,
            factory,
            preflight,
        }
    }

    pub fn with_preflight(mut self, preflight: Option<PreflightConfig>) -> Self {
        self.preflight = preflight;
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// The built-in login scenario followed by every YAML scenario in `specs_dir`
    pub fn scenarios(&self) -> E2eResult<Vec<TestSpec>> {
        let mut specs = vec![login_scenario(&self.config)];
        let dir = &self.config.runner.specs_dir;
        if dir.is_dir() {
            specs.extend(TestSpec::load_all(dir)?);
        } else {
            debug!("No scenario directory at {}", dir.display());
        }
        Ok(specs)
    }

    /// Run every scenario
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let specs = self.scenarios()?;
        self.run_specs(&specs).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = self.scenarios()?;
        let filtered: Vec<TestSpec> = TestSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_test(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let spec = self
            .scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Test not found: {}", name)))?;
        self.run_specs(std::slice::from_ref(&spec)).await
    }

    /// Run a list of scenarios, each in its own session
    pub async fn run_specs(&self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        if let Some(preflight) = &self.preflight {
            match check_reachable(&self.config.target.url, preflight).await {
                Ok(_) => {}
                Err(e) if self.config.target.preflight == PreflightMode::Required => return Err(e),
                // plain HTTP clients get refused where a browser is let in
                Err(e) => warn!("Preflight failed, trying the browser anyway: {}", e),
            }
        }

        let workers = self.config.runner.workers.max(1);
        info!("Running {} scenario(s) with {} worker(s)...", specs.len(), workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let ctx = StepContext::from_config(&self.config, self.credentials.clone());
        let mut tasks = JoinSet::new();

        for (index, spec) in specs.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let factory = Arc::clone(&self.factory);
            let ctx = ctx.clone();
            let video = self.config.use_options.video;
            let output_dir = self.config.runner.output_dir.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = run_spec(factory.as_ref(), &spec, &ctx, video, &output_dir).await;
                (index, result)
            });
        }

        let mut indexed = Vec::with_capacity(specs.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => indexed.push(pair),
                Err(e) => return Err(E2eError::Playwright(format!("scenario task panicked: {}", e))),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let results: Vec<TestResult> = indexed.into_iter().map(|(_, r)| r).collect();
        for result in &results {
            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let suite = TestSuiteResult::from_results(started_at, start.elapsed().as_millis() as u64, results);

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );

        Ok(suite)
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        let output_dir = &self.config.runner.output_dir;
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Run one scenario in a fresh session; the session is closed on every path
pub async fn run_spec(
    factory: &dyn DriverFactory,
    spec: &TestSpec,
    ctx: &StepContext,
    video: VideoMode,
    output_dir: &std::path::Path,
) -> TestResult {
    let start = Instant::now();
    debug!("Running scenario: {}", spec.name);

    let mut driver = match factory.launch(&spec.name, spec.viewport).await {
        Ok(driver) => driver,
        Err(e) => return TestResult::failed_before_start(&spec.name, e.to_string()),
    };

    let (step_results, test_error) = run_steps(driver.as_mut(), spec, ctx).await;

    let failure_screenshot = if test_error.is_some() {
        capture_failure(driver.as_mut(), output_dir, &spec.name).await
    } else {
        None
    };

    let recorded = match driver.close().await {
        Ok(path) => path,
        Err(e) => {
            warn!("Closing session '{}' failed: {}", spec.name, e);
            None
        }
    };

    let success = test_error.is_none();
    let video = match settle_video(video, success, recorded, &output_dir.join("videos"), &spec.name) {
        Ok(artifact) => artifact,
        Err(e) => {
            warn!("Could not keep video for '{}': {}", spec.name, e);
            None
        }
    };

    TestResult {
        name: spec.name.clone(),
        success,
        duration_ms: start.elapsed().as_millis() as u64,
        steps: step_results,
        error: test_error,
        video,
        failure_screenshot,
    }
}

async fn run_steps(
    driver: &mut dyn PageDriver,
    spec: &TestSpec,
    ctx: &StepContext,
) -> (Vec<StepResult>, Option<String>) {
    let mut step_results = Vec::with_capacity(spec.steps.len());

    for step in &spec.steps {
        let result = execute_step(driver, step, ctx).await;

        if !result.success {
            let error = E2eError::StepFailed {
                step: result.step_name.clone(),
                reason: result.error.clone().unwrap_or_default(),
            };
            step_results.push(result);
            return (step_results, Some(error.to_string()));
        }

        step_results.push(result);
    }

    (step_results, None)
}

async fn capture_failure(
    driver: &mut dyn PageDriver,
    output_dir: &std::path::Path,
    name: &str,
) -> Option<PathBuf> {
    let dir = output_dir.join("screenshots");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Cannot create {}: {}", dir.display(), e);
        return None;
    }
    let path = dir.join(format!("{}-failure.png", sanitize(name)));
    match driver.screenshot(&path).await {
        Ok(()) => Some(path),
        Err(e) => {
            warn!("Failure screenshot for '{}' not taken: {}", name, e);
            None
        }
    }
}
