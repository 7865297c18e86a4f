//! Graph API client
//!
//! Thin typed wrapper over `reqwest` for the ad platform. Every response body
//! is JSON; any body carrying a top-level `error` object is surfaced as a
//! [`ClientError::Platform`] with the normalized [`PlatformError`] payload,
//! regardless of HTTP status.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Graph API host.
pub const GRAPH_HOST: &str = "https://graph.facebook.com";
/// Graph API version every path is rooted under.
pub const GRAPH_VERSION: &str = "v8.0";

/// Normalized form of the failure payload the platform returns in a response
/// body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformError {
    #[serde(
        rename = "error_user_title",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub code: i64,
    #[serde(rename = "error_subcode", default)]
    pub subcode: i64,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "platform error {}/{} ({}): {}",
            self.code, self.subcode, self.kind, self.message
        )
    }
}

impl std::error::Error for PlatformError {}

/// Errors a Graph request can produce.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a decodable response.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The platform answered with an error envelope.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The response body did not decode into the expected shape.
    #[error("unable to decode platform response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Envelope probe: only the `error` member matters before the typed decode.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<PlatformError>,
}

/// Typed GET/POST client for the Graph API.
///
/// ## Example
///
/// ```no_run
/// use genetic_campaign_orchestrator::platform::GraphClient;
///
/// let client = GraphClient::new();
/// // point at a mock server in tests:
/// let client = GraphClient::new().with_base_url("http://127.0.0.1:9000");
/// ```
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    /// Create a client rooted at the production Graph host and version.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{GRAPH_HOST}/{GRAPH_VERSION}"),
        }
    }

    /// Override the base URL.
    ///
    /// Useful for pointing at a mock server in tests. The version segment is
    /// not re-appended; the override is used verbatim.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// GET `relative` with the given query parameters and decode the body.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Transport`] on network failure
    /// - [`ClientError::Platform`] when the body carries an error envelope
    /// - [`ClientError::Decode`] when the body is not the expected JSON
    pub async fn get<T>(&self, relative: &str, query: &[(&str, &str)]) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, relative))
            .query(query)
            .send()
            .await?;

        Self::decode(response).await
    }

    /// POST `body` as JSON to `relative` and decode the response.
    ///
    /// # Errors
    ///
    /// Same surface as [`GraphClient::get`].
    pub async fn post<B, T>(&self, relative: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, relative))
            .json(body)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let body = response.text().await?;
        let envelope: ErrorEnvelope = serde_json::from_str(&body)?;
        if let Some(platform_error) = envelope.error {
            return Err(ClientError::Platform(platform_error));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}
