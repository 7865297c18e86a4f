//! Platform authentication
//!
//! The orchestrator only needs `get_user`: resolve a user to stored platform
//! credentials plus a validity verdict. The full `auth_user` flow that
//! assembles those credentials in the first place lives here too: exchange
//! an OAuth code for a token, debug it, collect the user's pages (with their
//! Instagram accounts) and ad accounts, and persist the result.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Credentials;
use crate::entities::{AdAccount, Instagram, Page, PlatformAccount};
use crate::platform::client::{ClientError, GraphClient};
use crate::storage::{AccountStore, StoreError};

/// Errors raised by the auth flow.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No user id was supplied.
    #[error("user id must not be empty")]
    MissingUser,

    /// No authorization code was supplied.
    #[error("authorization code must not be empty")]
    MissingCode,

    /// A Graph request failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Reading or writing the stored account failed.
    #[error("account storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Resolves a user to platform credentials and their validity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The stored platform account for `user_id` plus whether its access
    /// token is currently valid.
    async fn get_user(&self, user_id: &str) -> Result<(PlatformAccount, bool), AuthError>;
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

/// The subset of `debug_token` data the flow consumes.
#[derive(Debug, Default, Deserialize)]
struct TokenDebug {
    #[serde(rename = "is_valid", default)]
    valid: bool,
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenDebugResponse {
    #[serde(default)]
    data: TokenDebug,
}

#[derive(Debug, Default, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Graph-backed [`AuthProvider`].
pub struct GraphAuth<S> {
    client: GraphClient,
    store: S,
    credentials: Credentials,
}

impl<S: AccountStore> GraphAuth<S> {
    /// Create a provider over an account store and the app credentials.
    pub fn new(client: GraphClient, store: S, credentials: Credentials) -> Self {
        Self {
            client,
            store,
            credentials,
        }
    }

    /// Run the full authentication flow for a fresh OAuth `code`:
    /// exchange it, validate the token, collect pages and ad accounts, and
    /// persist the assembled account under `user_id`.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingUser`] / [`AuthError::MissingCode`] on empty
    /// inputs; otherwise the first Graph or storage failure encountered.
    pub async fn auth_user(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<PlatformAccount, AuthError> {
        if user_id.is_empty() {
            return Err(AuthError::MissingUser);
        }
        if code.is_empty() {
            return Err(AuthError::MissingCode);
        }

        let token = self.exchange_code(code).await?;
        let debug = self.debug_token(&token).await?;
        let pages = self.pages(&token, &debug.user_id).await?;
        let ad_accounts = self.ad_accounts(&token, &debug.user_id).await?;

        let account = PlatformAccount {
            id: debug.user_id,
            pages,
            ad_accounts,
            access_token: token,
        };
        self.store.store_account(user_id, &account).await?;

        Ok(account)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let response: TokenResponse = self
            .client
            .get(
                "oauth/access_token",
                &[
                    ("client_id", self.credentials.client_id.as_str()),
                    ("redirect_uri", self.credentials.redirect_url.as_str()),
                    ("client_secret", self.credentials.client_secret.as_str()),
                    ("code", code),
                ],
            )
            .await?;

        Ok(response.access_token)
    }

    async fn debug_token(&self, token: &str) -> Result<TokenDebug, AuthError> {
        let response: TokenDebugResponse = self
            .client
            .get(
                "debug_token",
                &[
                    ("input_token", token),
                    ("access_token", self.credentials.app_token.as_str()),
                ],
            )
            .await?;

        Ok(response.data)
    }

    async fn pages(&self, token: &str, platform_user_id: &str) -> Result<Vec<Page>, AuthError> {
        let response: ListResponse<Page> = self
            .client
            .get(
                &format!("{platform_user_id}/accounts"),
                &[
                    ("access_token", token),
                    ("fields", "id,name,category,access_token"),
                ],
            )
            .await?;

        let mut pages = response.data;
        for page in &mut pages {
            let instagram: ListResponse<Instagram> = self
                .client
                .get(
                    &format!("{}/instagram_accounts", page.id),
                    &[
                        ("access_token", page.access_token.as_str()),
                        ("fields", "id,username"),
                    ],
                )
                .await?;
            page.instagram = instagram.data;
        }

        Ok(pages)
    }

    async fn ad_accounts(
        &self,
        token: &str,
        platform_user_id: &str,
    ) -> Result<Vec<AdAccount>, AuthError> {
        let response: ListResponse<AdAccount> = self
            .client
            .get(
                &format!("{platform_user_id}/adaccounts"),
                &[
                    ("access_token", token),
                    ("fields", "id,account_id,name,currency"),
                ],
            )
            .await?;

        Ok(response.data)
    }
}

#[async_trait]
impl<S: AccountStore> AuthProvider for GraphAuth<S> {
    async fn get_user(&self, user_id: &str) -> Result<(PlatformAccount, bool), AuthError> {
        if user_id.is_empty() {
            return Err(AuthError::MissingUser);
        }

        let account = self.store.get_account(user_id).await?;
        if account.access_token.is_empty() {
            // Never authenticated: nothing to debug remotely.
            return Ok((account, false));
        }

        let debug = self.debug_token(&account.access_token).await?;
        Ok((account, debug.valid))
    }
}
