//! Session coordinator configuration.
//!
//! Configuration is loaded from environment variables. The transport token is
//! redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::errors::CoordinatorError;

/// Default chain id carried on paid reactions.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Default idle-backup watchdog delay in seconds.
pub const DEFAULT_IDLE_BACKUP_SECONDS: u64 = 30;

/// Default rejoin watchdog delay in seconds.
pub const DEFAULT_REJOIN_CHECK_SECONDS: u64 = 5;

/// Default session actor mailbox size.
pub const DEFAULT_SESSION_MAILBOX: usize = 500;

/// Session coordinator configuration.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the REST API, handed to the REST client.
    pub api_url: String,

    /// Real-time transport URL.
    pub ws_url: String,

    /// Transport auth token.
    /// Protected by `SecretString` to prevent accidental logging.
    pub ws_token: SecretString,

    /// Receives reaction payments that would otherwise have no receiver.
    pub fallback_address: String,

    /// Chain id sent with `CHEER`/`BOO` (default: 1).
    pub chain_id: u64,

    /// Idle-backup watchdog delay (default: 30s).
    pub idle_backup: Duration,

    /// Rejoin watchdog delay (default: 5s).
    pub rejoin_check: Duration,

    /// Session actor mailbox size (default: 500).
    pub session_mailbox: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("ws_url", &self.ws_url)
            .field("ws_token", &"[REDACTED]")
            .field("fallback_address", &self.fallback_address)
            .field("chain_id", &self.chain_id)
            .field("idle_backup", &self.idle_backup)
            .field("rejoin_check", &self.rejoin_check)
            .field("session_mailbox", &self.session_mailbox)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for CoordinatorError {
    fn from(err: ConfigError) -> Self {
        CoordinatorError::Config(err.to_string())
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Parse a positive number of seconds; non-numeric values fall back to the default.
fn seconds(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<Duration, ConfigError> {
    let value = vars
        .get(name)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(default);
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_secs(value))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_url = required(vars, "OUTPOST_API_URL")?;
        let ws_url = required(vars, "OUTPOST_WS_URL")?;
        let ws_token = SecretString::from(required(vars, "OUTPOST_WS_TOKEN")?);
        let fallback_address = required(vars, "OUTPOST_FALLBACK_ADDRESS")?;

        let chain_id = vars
            .get("OUTPOST_CHAIN_ID")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_CHAIN_ID);

        let idle_backup = seconds(vars, "OUTPOST_IDLE_BACKUP_SECONDS", DEFAULT_IDLE_BACKUP_SECONDS)?;
        let rejoin_check = seconds(
            vars,
            "OUTPOST_REJOIN_CHECK_SECONDS",
            DEFAULT_REJOIN_CHECK_SECONDS,
        )?;

        let session_mailbox = vars
            .get("OUTPOST_SESSION_MAILBOX")
            .and_then(|s| s.trim().parse().ok())
            .filter(|size: &usize| *size > 0)
            .unwrap_or(DEFAULT_SESSION_MAILBOX);

        Ok(Config {
            api_url,
            ws_url,
            ws_token,
            fallback_address,
            chain_id,
            idle_backup,
            rejoin_check,
            session_mailbox,
        })
    }
}
