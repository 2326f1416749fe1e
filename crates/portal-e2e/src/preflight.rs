//! Reachability check of the portal before a browser is launched

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// What a failed reachability check means for the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreflightMode {
    /// No request is made
    Off,

    /// Log the failure and still run the scenarios in the browser
    #[default]
    Warn,

    /// Abort the run before any browser starts
    Required,
}

impl PreflightMode {
    pub fn enabled(&self) -> bool {
        !matches!(self, PreflightMode::Off)
    }
}

/// Retry policy for the probe
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// Total attempts, including the first
    pub attempts: usize,

    /// Delay before retry `n` is `backoff * 2^(n-1)`
    pub backoff: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(600),
            request_timeout: Duration::from_secs(25),
        }
    }
}

/// Outcome of a successful probe
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub status: u16,
    pub final_url: String,
    pub attempts: usize,
    pub elapsed: Duration,
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn backoff_delay(base: Duration, retry: usize) -> Duration {
    base * 2u32.saturating_pow(retry.saturating_sub(1) as u32)
}

/// GET `url` until it answers with a success or redirect status
pub async fn check_reachable(url: &str, config: &PreflightConfig) -> E2eResult<PreflightReport> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout)
        .build()?;

    let start = Instant::now();
    let attempts = config.attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            sleep(backoff_delay(config.backoff, attempt - 1)).await;
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                let report = PreflightReport {
                    status: resp.status().as_u16(),
                    final_url: resp.url().to_string(),
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
                info!("Target {} reachable ({})", url, report.status);
                return Ok(report);
            }
            Ok(resp) if is_retryable(resp.status()) => {
                warn!("Preflight attempt {} got {}", attempt, resp.status());
                last_reason = format!("status {}", resp.status());
            }
            Ok(resp) => {
                return Err(E2eError::Preflight {
                    attempts: attempt,
                    reason: format!("status {}", resp.status()),
                });
            }
            Err(e) => {
                warn!("Preflight attempt {} failed: {}", attempt, e);
                last_reason = e.to_string();
            }
        }
    }

    Err(E2eError::Preflight {
        attempts,
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_four_retries() {
        assert_eq!(PreflightConfig::default().attempts, 5);
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(600);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(600));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2400));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }
}
