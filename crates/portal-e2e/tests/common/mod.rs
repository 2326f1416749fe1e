//! In-memory portal used in place of a real browser
//!
//! The fake resolves locators with the same matching rules as the inventory
//! audit, enforces strictness (exactly one match per action) and switches to
//! a signed-in page when the submit button is clicked with the expected
//! credentials.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use portal_e2e::config::PortalConfig;
use portal_e2e::inventory::ControlItem;
use portal_e2e::preflight::PreflightMode;
use portal_e2e::spec::Viewport;
use portal_e2e::{DriverFactory, E2eError, E2eResult, LoadState, Locator, PageDriver};

pub const LANDING_URL: &str = "https://portal.test/HomePublic";
pub const HOME_URL: &str = "https://portal.test/services/dashboard";

pub const VALID_IDENTIFIER: &str = "29801011234567";
pub const VALID_SECRET: &str = "correct-horse";

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub control: ControlItem,
    pub visible: bool,
    pub value: String,
}

impl FakeElement {
    pub fn new(tag: &str, text: Option<&str>, attrs: &[(&str, &str)]) -> Self {
        Self {
            control: ControlItem {
                tag: tag.to_string(),
                text: text.map(String::from),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            },
            visible: true,
            value: String::new(),
        }
    }

    pub fn button(text: &str) -> Self {
        Self::new("button", Some(text), &[])
    }

    pub fn input(name: &str, input_type: &str, placeholder: &str) -> Self {
        Self::new(
            "input",
            None,
            &[("name", name), ("type", input_type), ("placeholder", placeholder)],
        )
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.control.attrs.get(name).map(String::as_str)
    }
}

/// Shape of the landing page
#[derive(Debug, Clone)]
pub struct PortalPage {
    pub consent: bool,
    pub identifier_placeholder: String,
    pub secret_placeholder: String,
    pub submit_text: String,
    pub extra: Vec<FakeElement>,
    pub record_video: bool,
}

impl Default for PortalPage {
    fn default() -> Self {
        Self {
            consent: false,
            identifier_placeholder: "Username or ID Number".to_string(),
            secret_placeholder: "Password".to_string(),
            submit_text: "Log in".to_string(),
            extra: vec![],
            record_video: false,
        }
    }
}

impl PortalPage {
    fn landing_elements(&self) -> Vec<FakeElement> {
        let mut elements = Vec::new();
        if self.consent {
            elements.push(FakeElement::button("Agree"));
        }
        elements.push(FakeElement::input("username", "text", &self.identifier_placeholder));
        elements.push(FakeElement::input("password", "password", &self.secret_placeholder));
        elements.push(FakeElement::button(&self.submit_text));
        elements.push(FakeElement::new("a", Some("Create account"), &[("href", "/register")]));
        elements.extend(self.extra.iter().cloned());
        elements
    }

    fn home_elements() -> Vec<FakeElement> {
        vec![
            FakeElement::new("a", Some("Log out"), &[("href", "/logout")]),
            FakeElement::new("a", Some("My services"), &[("href", "/services")]),
        ]
    }
}

/// Everything a test may want to inspect after a session
#[derive(Debug, Default)]
pub struct SessionLog {
    pub name: String,
    pub viewport: Option<Viewport>,
    pub url: String,
    pub events: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub load_waits: usize,
    pub screenshots: Vec<PathBuf>,
    pub closed: bool,
}

impl SessionLog {
    pub fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| e.as_str() == event).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.events.iter().position(|e| e.starts_with(prefix))
    }
}

pub struct FakePortal {
    page: PortalPage,
    elements: Vec<FakeElement>,
    video_dir: PathBuf,
    log: Arc<Mutex<SessionLog>>,
}

impl FakePortal {
    fn resolve(&self, locator: &Locator) -> E2eResult<usize> {
        let matches: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| locator.matches(&el.control))
            .map(|(i, _)| i)
            .collect();
        match matches.len() {
            0 => Err(E2eError::LocatorNotFound(locator.to_string())),
            1 => Ok(matches[0]),
            count => Err(E2eError::LocatorAmbiguous {
                locator: locator.to_string(),
                count,
            }),
        }
    }

    fn log(&self) -> std::sync::MutexGuard<'_, SessionLog> {
        self.log.lock().unwrap()
    }

    fn submit(&mut self) {
        let field = |name: &str| {
            self.elements
                .iter()
                .find(|el| el.attr("name") == Some(name))
                .map(|el| el.value.clone())
                .unwrap_or_default()
        };
        if field("username") == VALID_IDENTIFIER && field("password") == VALID_SECRET {
            self.elements = PortalPage::home_elements();
            self.log().url = HOME_URL.to_string();
        }
    }
}

#[async_trait]
impl PageDriver for FakePortal {
    async fn goto(&mut self, url: &str, wait_until: LoadState) -> E2eResult<()> {
        self.elements = self.page.landing_elements();
        let mut log = self.log();
        log.url = url.to_string();
        log.events.push(format!("goto:{}", wait_until.as_str()));
        Ok(())
    }

    async fn wait_for_load_state(&mut self, state: LoadState) -> E2eResult<()> {
        let mut log = self.log();
        log.load_waits += 1;
        log.events.push(format!("wait:{}", state.as_str()));
        Ok(())
    }

    async fn is_visible(&mut self, locator: &Locator) -> E2eResult<bool> {
        match self.resolve(locator) {
            Ok(index) => Ok(self.elements[index].visible),
            Err(E2eError::LocatorNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn click(&mut self, locator: &Locator) -> E2eResult<()> {
        let index = self.resolve(locator)?;
        if !self.elements[index].visible {
            return Err(E2eError::Timeout(format!("{} is not visible", locator)));
        }

        let text = self.elements[index].control.text.clone().unwrap_or_default();
        self.log().events.push(format!("click:{}", text.to_lowercase()));

        if text.eq_ignore_ascii_case("agree") {
            self.elements.remove(index);
        } else if text.eq_ignore_ascii_case(&self.page.submit_text) {
            self.submit();
        }
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> E2eResult<()> {
        let index = self.resolve(locator)?;
        if self.elements[index].control.tag != "input" {
            return Err(E2eError::Driver {
                kind: "other".into(),
                message: "element is not an input".into(),
            });
        }
        self.elements[index].value = value.to_string();
        let name = self.elements[index].attr("name").unwrap_or_default().to_string();
        let mut log = self.log();
        log.events.push(format!("fill:{}", name));
        log.fills.push((name, value.to_string()));
        Ok(())
    }

    async fn url(&mut self) -> E2eResult<String> {
        Ok(self.log().url.clone())
    }

    async fn content(&mut self) -> E2eResult<String> {
        let body: String = self
            .elements
            .iter()
            .map(|el| format!("<{0}>{1}</{0}>", el.control.tag, el.control.text.clone().unwrap_or_default()))
            .collect();
        Ok(format!("<html><body>{}</body></html>", body))
    }

    async fn controls(&mut self) -> E2eResult<Vec<ControlItem>> {
        Ok(self.elements.iter().map(|el| el.control.clone()).collect())
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        std::fs::write(path, b"\x89PNG")?;
        self.log().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<Option<PathBuf>> {
        let mut log = self.log();
        log.closed = true;
        log.events.push("close".to_string());

        if !self.page.record_video {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.video_dir)?;
        let path = self.video_dir.join(format!("{}-raw.webm", log.name));
        std::fs::write(&path, format!("video of {}", log.name))?;
        Ok(Some(path))
    }
}

/// Hands out [`FakePortal`] sessions and keeps their logs
#[derive(Clone)]
pub struct FakeFactory {
    pub page: PortalPage,
    pub video_dir: PathBuf,
    pub fail_launch: bool,
    pub sessions: Arc<Mutex<Vec<Arc<Mutex<SessionLog>>>>>,
}

impl FakeFactory {
    pub fn new(page: PortalPage, video_dir: &Path) -> Self {
        Self {
            page,
            video_dir: video_dir.to_path_buf(),
            fail_launch: false,
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn session(&self, index: usize) -> Arc<Mutex<SessionLog>> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl DriverFactory for FakeFactory {
    async fn launch(
        &self,
        session: &str,
        viewport: Option<Viewport>,
    ) -> E2eResult<Box<dyn PageDriver>> {
        if self.fail_launch {
            return Err(E2eError::PlaywrightNotFound);
        }
        let log = Arc::new(Mutex::new(SessionLog {
            name: session.to_string(),
            viewport,
            ..Default::default()
        }));
        self.sessions.lock().unwrap().push(Arc::clone(&log));
        Ok(Box::new(FakePortal {
            page: self.page.clone(),
            elements: vec![],
            video_dir: self.video_dir.clone(),
            log,
        }))
    }
}

/// Config pointed at the fake portal, writing into `output_dir`
pub fn test_config(output_dir: &Path) -> PortalConfig {
    let mut config = PortalConfig::default();
    config.target.url = LANDING_URL.to_string();
    config.target.preflight = PreflightMode::Off;
    config.runner.output_dir = output_dir.to_path_buf();
    config.runner.specs_dir = output_dir.join("no-scenarios");
    config.use_options.consent_probe_ms = 200;
    config
}
