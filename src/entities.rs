//! Persistent domain entities
//!
//! These are the records the stores read and write: finalized campaigns and
//! the platform account data the auth flow assembles. Field names mirror the
//! wire/storage attribute names.

use serde::{Deserialize, Serialize};

use crate::genetic::Chromosome;

/// A finalized campaign record.
///
/// Created once by the orchestrator at the end of a successful run and never
/// mutated afterwards. Embeds the generation of chromosomes the campaign was
/// launched with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub budget: String,
    pub start_time: String,
    pub end_time: String,
    pub targeting: Vec<Chromosome>,
    pub media: Vec<Media>,
}

/// Media used in a campaign's creative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Media {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub video_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_hash: String,
}

/// Platform-side account data for a user: the pages and ad accounts the user
/// manages plus the access token the orchestrator acts with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformAccount {
    pub id: String,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub ad_accounts: Vec<AdAccount>,
    #[serde(default)]
    pub access_token: String,
}

/// A page the user manages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instagram: Vec<Instagram>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
}

/// An Instagram account attached to a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instagram {
    pub id: String,
    #[serde(rename = "username")]
    pub name: String,
}

/// An ad account the user can bill campaigns to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdAccount {
    pub account_id: String,
    pub id: String,
    pub name: String,
    pub currency: String,
}
