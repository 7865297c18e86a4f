//! Process configuration
//!
//! The handful of environment inputs the crate needs: the app credentials
//! the auth flow acts with and the path of the targeting-tree template.
//! Everything else is injected programmatically.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the targeting template file.
pub const DEFAULT_TEMPLATE_PATH: &str = "targetingTree.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),
}

/// Platform app credentials used by the auth flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// App client id (`clientID`).
    pub client_id: String,
    /// App client secret (`clientSecret`).
    pub client_secret: String,
    /// OAuth redirect URL (`redirectURL`).
    pub redirect_url: String,
    /// App token used to debug user tokens (`appToken`).
    pub app_token: String,
}

/// Full process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Platform app credentials.
    pub credentials: Credentials,
    /// Path of the targeting-tree template file.
    pub template_path: PathBuf,
}

impl AppConfig {
    /// Assemble the configuration from the environment.
    ///
    /// Reads `clientID`, `clientSecret`, `redirectURL` and `appToken`
    /// (required) and `TARGETING_TREE_PATH` (optional, defaulting to
    /// [`DEFAULT_TEMPLATE_PATH`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] naming the first required
    /// variable that is absent or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            credentials: Credentials {
                client_id: required_var("clientID")?,
                client_secret: required_var("clientSecret")?,
                redirect_url: required_var("redirectURL")?,
                app_token: required_var("appToken")?,
            },
            template_path: std::env::var("TARGETING_TREE_PATH")
                .unwrap_or_else(|_| DEFAULT_TEMPLATE_PATH.to_string())
                .into(),
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}
