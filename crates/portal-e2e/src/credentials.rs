//! Login credentials
//!
//! Resolution order: environment, then the `[credentials]` config table, then
//! the built-in defaults.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const IDENTIFIER_ENV: &str = "PORTAL_IDENTIFIER";
pub const SECRET_ENV: &str = "PORTAL_SECRET";

pub const DEFAULT_IDENTIFIER: &str = "Ahmed Ashraf";
pub const DEFAULT_SECRET: &str = "123";

/// `[credentials]` table
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("identifier", &self.identifier)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Identifier/secret pair used for one run
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identifier: String,
    secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// Resolve from the process environment and `config`
    pub fn resolve(config: &CredentialsConfig) -> Self {
        Self::resolve_with(config, |key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` in place of the process environment
    pub fn resolve_with<F>(config: &CredentialsConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |env_key: &str, configured: &Option<String>, default: &str| {
            lookup(env_key)
                .filter(|v| !v.is_empty())
                .or_else(|| configured.clone())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            identifier: pick(IDENTIFIER_ENV, &config.identifier, DEFAULT_IDENTIFIER),
            secret: pick(SECRET_ENV, &config.secret, DEFAULT_SECRET),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFIER, DEFAULT_SECRET)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"***")
            .finish()
    }
}
