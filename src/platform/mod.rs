//! Ad-platform integration
//!
//! Everything that talks to the Graph API: the typed HTTP client, the
//! authentication flow, the insights-backed quality oracle, the targeting
//! template and chromosome construction, and the campaign creation pipeline.

pub mod auth;
pub mod campaign;
pub mod client;
pub mod quality;
pub mod template;

pub use auth::{AuthError, AuthProvider, GraphAuth};
pub use campaign::{
    CampaignCreator, Request, RequestError, POPULATION_SIZE, SELECTION_SIZE,
};
pub use client::{ClientError, GraphClient, PlatformError, GRAPH_HOST, GRAPH_VERSION};
pub use quality::{InsightsOracle, OracleError};
pub use template::{ChromosomeBuilder, TargetingTemplate, TemplateError};
