//! # genetic-campaign-orchestrator
//!
//! A genetic algorithm over tree-structured audience-targeting chromosomes,
//! plus the pipeline that applies one generation of it each time a campaign
//! is launched on the ad platform.
//!
//! ## Architecture
//!
//! ```text
//! Request → validate → auth → remote campaign
//!         → segment population → fitness → selection → mutate-fill
//!         → one ad-set per chromosome → persist population
//!         → one creative → one ad per ad-set → persist campaign record
//! ```
//!
//! The engine (`genetic`) is pure given its two injected seams: a quality
//! oracle and a uniform sampler. The platform layer (`platform`) supplies
//! the Graph-backed oracle, the auth flow, and the orchestrator. Storage
//! (`storage`) is a set of async traits with an in-memory implementation.

use thiserror::Error;

pub mod config;
pub mod entities;
pub mod genetic;
pub mod platform;
pub mod storage;

// Re-exports
pub use genetic::{Chromosome, Gene, GeneticEngine, TargetingKind};
pub use platform::{CampaignCreator, GraphClient, Request};

use genetic::EngineError;
use platform::auth::AuthError;
use platform::campaign::RequestError;
use platform::client::ClientError;
use storage::StoreError;

/// How loud a failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected rejections: bad input, stale credentials.
    Warning,
    /// The platform or the data refused the operation.
    Error,
    /// Infrastructure gave way: transport, storage, encoding.
    Panic,
}

/// Top-level error of the campaign pipeline.
#[derive(Debug, Error)]
pub enum CampaignError {
    /// The request failed validation; nothing was created.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// The user's platform access token is expired or invalid.
    #[error("platform access token has expired or is invalid")]
    ExpiredCredentials,

    /// A genetic engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A Graph request failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The auth flow failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A persistence operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CampaignError {
    /// The reporting level for this failure.
    pub fn severity(&self) -> Severity {
        match self {
            CampaignError::InvalidRequest(_) | CampaignError::ExpiredCredentials => {
                Severity::Warning
            }
            CampaignError::Engine(_) => Severity::Error,
            CampaignError::Client(ClientError::Platform(_)) => Severity::Error,
            CampaignError::Client(_) => Severity::Panic,
            CampaignError::Auth(AuthError::Client(ClientError::Platform(_))) => Severity::Error,
            CampaignError::Auth(AuthError::MissingUser | AuthError::MissingCode) => {
                Severity::Warning
            }
            CampaignError::Auth(_) => Severity::Panic,
            CampaignError::Store(_) => Severity::Panic,
        }
    }
}

/// Initialise tracing with env-filter support. Call once at binary startup.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

/// Log `error` at the level its severity calls for.
pub fn report(error: &CampaignError) {
    match error.severity() {
        Severity::Warning => tracing::warn!(error = %error, "campaign pipeline warning"),
        Severity::Error => tracing::error!(error = %error, "campaign pipeline error"),
        Severity::Panic => {
            tracing::error!(error = %error, "campaign pipeline infrastructure failure")
        }
    }
}
