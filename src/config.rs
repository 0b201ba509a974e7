//! Environment-based configuration.
//!
//! The two token-signing secrets are deployment credentials and are required
//! at startup; everything else has a development default. Missing or equal
//! secrets abort startup with a loud error rather than limping along with a
//! guessable default.

use anyhow::{bail, Result};
use std::path::PathBuf;

/// Deployment environment; toggles refresh-cookie strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// Runtime configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    /// HS256 secret for access tokens.
    pub access_secret: String,
    /// HS256 secret for refresh tokens. Must differ from `access_secret`.
    pub refresh_secret: String,
    pub environment: Environment,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let access_secret = require_env("MAITRED_ACCESS_SECRET")?;
        let refresh_secret = require_env("MAITRED_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            bail!(
                "MAITRED_ACCESS_SECRET and MAITRED_REFRESH_SECRET must be distinct — \
                 a shared secret lets a leaked access token mint new sessions"
            );
        }

        let environment = match std::env::var("MAITRED_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        let db_path = std::env::var("MAITRED_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("maitred.db"));

        let host = std::env::var("MAITRED_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let port = match std::env::var("MAITRED_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("MAITRED_PORT is not a valid port: {raw}"))?,
            Err(_) => 5000,
        };

        Ok(Self {
            access_secret,
            refresh_secret,
            environment,
            db_path,
            host,
            port,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn require_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("missing required environment variable: {key}"),
    }
}
