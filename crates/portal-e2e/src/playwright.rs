//! Playwright browser automation
//!
//! Each [`PlaywrightDriver`] is a Node.js child process running the embedded
//! driver script. Requests and responses are single-line JSON objects over
//! the child's stdin and stdout; anything else the child prints is logged.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::artifacts::sanitize;
use crate::config::PortalConfig;
use crate::driver::{DriverFactory, LoadState, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::inventory::{ControlItem, CONTROL_SELECTOR};
use crate::locator::Locator;
use crate::spec::Viewport;

/// How long a driver gets between SIGTERM and SIGKILL
const TERM_GRACE: Duration = Duration::from_millis(500);

const DRIVER_SCRIPT: &str = include_str!("driver.js");

/// Extra time granted on top of Playwright's own timeouts before the bridge gives up
const RESPONSE_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser '{}'", other)),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub action_timeout: Duration,
    pub navigation_timeout: Duration,
    pub launch_timeout: Duration,

    /// Parent directory for raw recordings; `None` disables video
    pub video_dir: Option<PathBuf>,

    /// `node_modules` that provides `playwright`
    pub node_modules: PathBuf,

    /// Interpreter used to run the driver script
    pub node_binary: String,

    /// Replaces the embedded driver script
    pub driver_script: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            action_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(60),
            video_dir: None,
            node_modules: PathBuf::from("node_modules"),
            node_binary: "node".to_string(),
            driver_script: None,
        }
    }
}

impl PlaywrightConfig {
    pub fn from_portal(config: &PortalConfig) -> Self {
        let opts = &config.use_options;
        Self {
            browser: opts.browser,
            headless: opts.headless,
            viewport_width: opts.viewport_width,
            viewport_height: opts.viewport_height,
            action_timeout: Duration::from_millis(opts.action_timeout_ms),
            navigation_timeout: Duration::from_millis(opts.navigation_timeout_ms),
            video_dir: opts
                .video
                .records()
                .then(|| config.runner.output_dir.join("videos").join("raw")),
            node_modules: config.runner.node_modules.clone(),
            ..Default::default()
        }
    }

    fn launch_options(&self, session: &str) -> Value {
        json!({
            "browser": self.browser.as_str(),
            "headless": self.headless,
            "viewport_width": self.viewport_width,
            "viewport_height": self.viewport_height,
            "action_timeout_ms": self.action_timeout.as_millis() as u64,
            "navigation_timeout_ms": self.navigation_timeout.as_millis() as u64,
            "video_dir": self.video_dir.as_ref().map(|d| d.join(sanitize(session))),
        })
    }

    fn response_timeout(&self) -> Duration {
        self.action_timeout.max(self.navigation_timeout) + RESPONSE_GRACE
    }
}

/// Check if Playwright is installed
pub fn check_playwright_installed() -> E2eResult<()> {
    let output = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match output {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

/// One line from the driver
#[derive(Debug, Deserialize)]
struct DriverMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<DriverFailure>,
    #[serde(default)]
    event: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DriverFailure {
    kind: String,
    message: String,
    #[serde(default)]
    count: Option<usize>,
}

impl DriverFailure {
    /// Map to an error, naming `subject` (usually the locator) in the message
    fn into_error(self, subject: &str) -> E2eError {
        match self.kind.as_str() {
            "timeout" => E2eError::Timeout(format!("{}: {}", subject, first_line(&self.message))),
            "strict" => E2eError::LocatorAmbiguous {
                locator: subject.to_string(),
                count: self.count.unwrap_or(2),
            },
            "not_found" => E2eError::LocatorNotFound(subject.to_string()),
            _ => E2eError::Driver {
                kind: self.kind,
                message: first_line(&self.message).to_string(),
            },
        }
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message).trim()
}

/// Playwright browser session
pub struct PlaywrightDriver {
    session: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    response_timeout: Duration,
    closed: bool,

    /// Keeps the staged driver script alive for the life of the child
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Spawn the driver and wait until its browser is up
    pub async fn launch(config: &PlaywrightConfig, session: &str) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = match &config.driver_script {
            Some(path) => path.clone(),
            None => {
                let path = script_dir.path().join("driver.js");
                std::fs::write(&path, DRIVER_SCRIPT)?;
                path
            }
        };

        if let Some(dir) = &config.video_dir {
            std::fs::create_dir_all(dir.join(sanitize(session)))?;
        }

        let node_path = std::fs::canonicalize(&config.node_modules)
            .unwrap_or_else(|_| config.node_modules.clone());

        debug!("Launching driver {} for session '{}'", script_path.display(), session);

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .arg(config.launch_options(session).to_string())
            .env("NODE_PATH", node_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!("Failed to spawn {}: {}", config.node_binary, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let session = session.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[{}] driver: {}", session, line);
                }
            });
        }

        let mut driver = Self {
            session: session.to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            response_timeout: config.response_timeout(),
            closed: false,
            _script_dir: script_dir,
        };

        match tokio::time::timeout(config.launch_timeout, driver.wait_ready()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(E2eError::Timeout(format!(
                    "browser launch for session '{}'",
                    session
                )))
            }
        }

        info!(
            "Session '{}' ready ({}, headless: {})",
            session,
            config.browser.as_str(),
            config.headless
        );
        Ok(driver)
    }

    async fn wait_ready(&mut self) -> E2eResult<()> {
        loop {
            let message = self.next_message().await?;
            match message.event.as_deref() {
                Some("ready") => return Ok(()),
                Some("fatal") => {
                    let reason = message
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown error".into());
                    return Err(E2eError::Playwright(format!(
                        "browser failed to start: {}",
                        first_line(&reason)
                    )));
                }
                _ => {}
            }
        }
    }

    /// Next JSON line from the driver, skipping anything that is not JSON
    async fn next_message(&mut self) -> E2eResult<DriverMessage> {
        loop {
            let line = self.stdout.next_line().await?.ok_or_else(|| {
                E2eError::Playwright(format!("driver for session '{}' exited", self.session))
            })?;
            match serde_json::from_str::<DriverMessage>(&line) {
                Ok(message) => return Ok(message),
                Err(_) => debug!("[{}] driver: {}", self.session, line),
            }
        }
    }

    /// Send `cmd` with `args` and wait for the matching response
    async fn request(&mut self, cmd: &str, args: Value, subject: &str) -> E2eResult<Value> {
        if self.closed {
            return Err(E2eError::Playwright(format!(
                "session '{}' is already closed",
                self.session
            )));
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut payload = match args {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        payload.insert("id".into(), json!(id));
        payload.insert("cmd".into(), json!(cmd));

        // payload may carry a secret; log the command only
        debug!("[{}] -> #{} {} {}", self.session, id, cmd, subject);

        let mut line = serde_json::to_string(&payload)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let timeout = self.response_timeout;
        let response = tokio::time::timeout(timeout, async {
            loop {
                let message = self.next_message().await?;
                if message.id == Some(id) {
                    return Ok::<_, E2eError>(message);
                }
                if let Some(event) = &message.event {
                    debug!("[{}] driver event: {}", self.session, event);
                }
            }
        })
        .await
        .map_err(|_| E2eError::Timeout(format!("driver response to {} {}", cmd, subject)))??;

        if response.ok {
            Ok(response.value)
        } else {
            let failure = response.error.unwrap_or(DriverFailure {
                kind: "other".into(),
                message: "driver reported failure without details".into(),
                count: None,
            });
            Err(failure.into_error(subject))
        }
    }

    /// SIGTERM first so the browser can flush its video, SIGKILL after [`TERM_GRACE`]
    fn terminate(&mut self) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                let deadline = Instant::now() + TERM_GRACE;
                while Instant::now() < deadline {
                    if matches!(self.child.try_wait(), Ok(Some(_))) {
                        debug!("Driver for '{}' exited on SIGTERM", self.session);
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                warn!("Driver for '{}' ignored SIGTERM, killing it", self.session);
            }
        }
        let _ = self.child.start_kill();
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn goto(&mut self, url: &str, wait_until: LoadState) -> E2eResult<()> {
        self.request(
            "goto",
            json!({ "url": url, "wait_until": wait_until.as_str() }),
            url,
        )
        .await?;
        Ok(())
    }

    async fn wait_for_load_state(&mut self, state: LoadState) -> E2eResult<()> {
        self.request(
            "wait_for_load_state",
            json!({ "state": state.as_str() }),
            state.as_str(),
        )
        .await?;
        Ok(())
    }

    async fn is_visible(&mut self, locator: &Locator) -> E2eResult<bool> {
        let value = self
            .request("is_visible", json!({ "locator": locator.wire() }), &locator.to_string())
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&mut self, locator: &Locator) -> E2eResult<()> {
        self.request("click", json!({ "locator": locator.wire() }), &locator.to_string())
            .await?;
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> E2eResult<()> {
        self.request(
            "fill",
            json!({ "locator": locator.wire(), "value": value }),
            &locator.to_string(),
        )
        .await?;
        Ok(())
    }

    async fn url(&mut self) -> E2eResult<String> {
        let value = self.request("url", json!({}), "page").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn content(&mut self) -> E2eResult<String> {
        let value = self.request("content", json!({}), "page").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn controls(&mut self) -> E2eResult<Vec<ControlItem>> {
        let value = self
            .request("controls", json!({ "selector": CONTROL_SELECTOR }), "controls")
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        let subject = path.display().to_string();
        self.request("screenshot", json!({ "path": path }), &subject)
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<Option<PathBuf>> {
        if self.closed {
            return Ok(None);
        }
        let result = self.request("close", json!({}), "session").await;
        self.closed = true;

        let _ = tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await;
        self.terminate();

        let value = result?;
        Ok(value.as_str().map(PathBuf::from))
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Session '{}' dropped without close, terminating driver", self.session);
        }
        self.terminate();
    }
}

/// Launches one [`PlaywrightDriver`] per session
pub struct PlaywrightFactory {
    config: PlaywrightConfig,
}

impl PlaywrightFactory {
    /// Create a factory after verifying Playwright is installed
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        check_playwright_installed()?;
        Ok(Self::unchecked(config))
    }

    /// Create a factory without the installation check
    pub fn unchecked(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for PlaywrightFactory {
    async fn launch(
        &self,
        session: &str,
        viewport: Option<Viewport>,
    ) -> E2eResult<Box<dyn PageDriver>> {
        let driver = match viewport {
            Some(viewport) => {
                let config = PlaywrightConfig {
                    viewport_width: viewport.width,
                    viewport_height: viewport.height,
                    ..self.config.clone()
                };
                PlaywrightDriver::launch(&config, session).await?
            }
            None => PlaywrightDriver::launch(&self.config, session).await?,
        };
        Ok(Box::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options() {
        let config = PlaywrightConfig {
            headless: false,
            video_dir: Some(PathBuf::from("test-results/videos/raw")),
            ..Default::default()
        };
        let options = config.launch_options("portal-login");
        assert_eq!(options["headless"], json!(false));
        assert_eq!(options["browser"], json!("chromium"));
        assert_eq!(
            options["video_dir"],
            json!("test-results/videos/raw/portal-login")
        );

        let options = PlaywrightConfig::default().launch_options("s");
        assert!(options["video_dir"].is_null());
    }

    #[test]
    fn test_from_portal_records_only_when_video_enabled() {
        let mut portal = PortalConfig::default();
        assert!(PlaywrightConfig::from_portal(&portal).video_dir.is_none());

        portal.use_options.video = crate::artifacts::VideoMode::On;
        portal.use_options.headless = false;
        let config = PlaywrightConfig::from_portal(&portal);
        assert_eq!(
            config.video_dir,
            Some(PathBuf::from("test-results").join("videos").join("raw"))
        );
        assert!(!config.headless);
    }

    #[test]
    fn test_failure_mapping() {
        let strict: DriverMessage = serde_json::from_str(
            r#"{"id":3,"ok":false,"error":{"kind":"strict","count":3,"message":"strict mode violation"}}"#,
        )
        .unwrap();
        let err = strict.error.unwrap().into_error("role=button");
        assert!(matches!(err, E2eError::LocatorAmbiguous { count: 3, .. }));

        let timeout = DriverFailure {
            kind: "timeout".into(),
            message: "Timeout 30000ms exceeded.\n=== logs ===".into(),
            count: None,
        };
        match timeout.into_error("https://portal") {
            E2eError::Timeout(msg) => assert_eq!(msg, "https://portal: Timeout 30000ms exceeded."),
            other => panic!("unexpected {:?}", other),
        }

        let missing = DriverFailure {
            kind: "not_found".into(),
            message: String::new(),
            count: None,
        };
        assert!(missing.into_error("placeholder").is_locator_error());
    }

    #[test]
    fn test_locator_wire_format() {
        let locator = Locator::placeholder("username or id number");
        assert_eq!(
            json!({ "locator": locator.wire() }),
            json!({ "locator": {
                "by": "placeholder",
                "pattern": { "source": r"username\s+or\s+id\s+number", "flags": "i" }
            } })
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bridge_round_trip_with_scripted_driver() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-driver.sh");
        std::fs::write(
            &script,
            r#"
echo "starting"
echo '{"event":"ready"}'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"cmd":"close"'*)
      echo "{\"id\":$id,\"ok\":true,\"value\":\"/tmp/session.webm\"}"
      exit 0 ;;
    *'"cmd":"click"'*)
      echo "{\"id\":$id,\"ok\":false,\"error\":{\"kind\":\"strict\",\"count\":2,\"message\":\"strict mode violation\"}}" ;;
    *)
      echo "console noise"
      echo "{\"id\":$id,\"ok\":true,\"value\":\"https://portal.test/home\"}" ;;
  esac
done
"#,
        )
        .unwrap();

        let config = PlaywrightConfig {
            node_binary: "sh".into(),
            driver_script: Some(script),
            launch_timeout: Duration::from_secs(10),
            ..Default::default()
        };

        let mut driver = PlaywrightDriver::launch(&config, "scripted").await.unwrap();
        assert_eq!(driver.url().await.unwrap(), "https://portal.test/home");

        let err = driver
            .click(&Locator::role("button", "log in").exact())
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::LocatorAmbiguous { count: 2, .. }));

        let video = driver.close().await.unwrap();
        assert_eq!(video, Some(PathBuf::from("/tmp/session.webm")));
        assert!(driver.url().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_driver_gets_sigterm_before_kill() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("terminated");
        let script = dir.path().join("slow-driver.sh");
        std::fs::write(
            &script,
            format!(
                r#"
trap 'echo term > "{}"; exit 0' TERM
echo '{{"event":"ready"}}'
while :; do sleep 0.05; done
"#,
                marker.display()
            ),
        )
        .unwrap();

        let config = PlaywrightConfig {
            node_binary: "sh".into(),
            driver_script: Some(script),
            launch_timeout: Duration::from_secs(10),
            ..Default::default()
        };

        let driver = PlaywrightDriver::launch(&config, "dropped").await.unwrap();
        drop(driver);

        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "term");
    }
}
