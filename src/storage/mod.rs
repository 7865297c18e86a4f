//! # Persistence seams
//!
//! ## Responsibility
//! The typed storage surface the orchestrator and auth flow depend on:
//! populations keyed by `(user, segment)`, finalized campaign records with
//! their secondary indexes, and the per-user platform account.
//!
//! ## Guarantees
//! - Operations are atomic at single-record granularity; no multi-key
//!   transactions are assumed
//! - Missing records read back as the typed empty value, except
//!   [`CampaignStore::get_campaign`] which distinguishes absent from corrupt
//!
//! ## NOT Responsible For
//! - Choosing a backend: callers inject any implementation; the crate ships
//!   an in-memory one (see `storage::memory`)

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{Campaign, PlatformAccount};
use crate::genetic::Chromosome;

pub use memory::MemoryStore;

/// Errors raised by the persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required key component was empty.
    #[error("missing {0} in storage key")]
    MissingKey(&'static str),

    /// The campaign record lacked one of its required fields.
    #[error("campaign record is missing required fields")]
    InvalidCampaign,

    /// The platform account to store carries no access token.
    #[error("platform account is missing its access token")]
    MissingAccessToken,

    /// No campaign exists under the given id.
    #[error("campaign {0} was not found")]
    NotFound(String),

    /// A stored value failed to encode or decode.
    #[error("unable to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),

    /// The backend itself failed.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Persistence of evolving populations, keyed by `(user, segment)`.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Replace the population of `segment` and record the segment name in
    /// the user's segment list.
    async fn set_segment(
        &self,
        user_id: &str,
        segment: &str,
        population: &[Chromosome],
    ) -> Result<(), StoreError>;

    /// Current population of `segment`; empty when the segment has never
    /// been written.
    async fn get_segment(&self, user_id: &str, segment: &str)
        -> Result<Vec<Chromosome>, StoreError>;

    /// Names of every segment the user has written.
    async fn get_segments(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Persistence of finalized campaign records with their secondary indexes.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Persist a finalized campaign under its id.
    async fn store_campaign(
        &self,
        user_id: &str,
        platform: &str,
        ad_account: &str,
        segment: &str,
        campaign: &Campaign,
    ) -> Result<(), StoreError>;

    /// Fetch a campaign by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no record exists; [`StoreError::Encode`]
    /// when the record exists but does not decode.
    async fn get_campaign(&self, campaign_id: &str) -> Result<Campaign, StoreError>;

    /// All campaign ids of a user, grouped by platform.
    async fn get_user_campaigns(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, Vec<String>>, StoreError>;

    /// Ids of campaigns on `platform` whose end time lies in the future,
    /// grouped by user.
    async fn get_active_campaigns(
        &self,
        platform: &str,
    ) -> Result<HashMap<String, Vec<String>>, StoreError>;

    /// Ids of every campaign a `(user, segment)` pair has launched, sorted
    /// by end time descending.
    async fn get_segment_campaigns(
        &self,
        user_id: &str,
        segment: &str,
    ) -> Result<Vec<String>, StoreError>;
}

/// Persistence of the per-user platform account the auth flow assembles.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Persist the platform account for `user_id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingAccessToken`] when the account carries no
    /// access token.
    async fn store_account(
        &self,
        user_id: &str,
        account: &PlatformAccount,
    ) -> Result<(), StoreError>;

    /// The stored platform account; the empty account when none was stored.
    async fn get_account(&self, user_id: &str) -> Result<PlatformAccount, StoreError>;
}
