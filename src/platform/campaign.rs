//! # Campaign creation pipeline
//!
//! ## Responsibility
//! One generation per launch: validate the request, resolve credentials,
//! create the remote campaign, advance the segment's population through the
//! genetic engine, materialize one ad-set per chromosome, persist the new
//! population, attach one creative and one ad per ad-set, and store the
//! finalized campaign record.
//!
//! ## Guarantees
//! - Fail fast with no compensating remote cleanup: a failure after the
//!   campaign was created leaves the remote campaign in place
//! - Steps run in a fixed order; ad-sets are created sequentially so each
//!   chromosome binds to the ad-set created for it
//! - Validation rejects before any remote or storage side effect
//!
//! ## NOT Responsible For
//! - Scoring or sampling (see `genetic`)
//! - Credential assembly (see `platform::auth`)
//! - Storage backends (see `storage`)

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::entities::{Campaign, Media, Page};
use crate::genetic::{
    Chromosome, Gene, GeneticEngine, OsSampler, TargetingKind, UniformSampler,
};
use crate::platform::auth::AuthProvider;
use crate::platform::client::GraphClient;
use crate::platform::quality::InsightsOracle;
use crate::storage::{CampaignStore, SegmentStore};
use crate::CampaignError;

/// Canonical population size after a generation.
pub const POPULATION_SIZE: usize = 30;
/// Number of elite chromosomes carried over per generation.
pub const SELECTION_SIZE: usize = 5;

const MINIMUM_DAILY_BUDGET: &str = "3000";
const OBJECTIVE_PAGE_LIKES: &str = "PAGE_LIKES";
const OBJECTIVE_CONVERSIONS: &str = "CONVERSIONS";

/// Why a request was rejected before any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request is missing the segment name")]
    MissingSegment,
    #[error("request mutation rate must lie in (0, 0.20]")]
    InvalidMutationRate,
    #[error("request is missing the ad account")]
    MissingAdAccount,
    #[error("request is missing the campaign name")]
    MissingCampaignName,
    #[error("request budget is below the minimum daily budget")]
    InvalidBudget,
    #[error("request is missing the special ad categories")]
    MissingSpecialAdCategory,
    #[error("request is missing the campaign objective")]
    MissingObjective,
    #[error("request is missing the start time")]
    MissingStartTime,
    #[error("request is missing the end time")]
    MissingEndTime,
    #[error("request is missing the geolocation")]
    MissingLocation,
    #[error("request is missing the gender selection")]
    MissingGender,
    #[error("request is missing the age band")]
    MissingAge,
    #[error("request is missing the page")]
    MissingPage,
    #[error("request is missing the call to action")]
    MissingCallToAction,
    #[error("request is missing the creative name")]
    MissingCreativeName,
    #[error("request is missing the creative media")]
    MissingCreativeMedia,
}

/// Geographic targeting of the ad-sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cities: Vec<City>,
    #[serde(rename = "country_group", default, skip_serializing_if = "Vec::is_empty")]
    pub country_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<Region>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zips: Vec<Zip>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub key: String,
    #[serde(default)]
    pub radius: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zip {
    pub key: String,
}

/// Creative call to action. The type can be `NONE` but the field itself must
/// be present on a valid request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToAction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: CallToActionValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToActionValue {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub page: String,
}

/// Everything a caller supplies to launch one campaign.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Request {
    // Campaign data
    pub name: String,
    pub objective: String,
    pub budget: String,
    pub special_ad_categories: Option<Vec<String>>,
    // Population and optimization data
    pub segment: String,
    pub mutation_rate: f64,
    // Ad-set data
    pub pixel_id: String,
    #[serde(rename = "start")]
    pub start_time: String,
    #[serde(rename = "end")]
    pub end_time: String,
    #[serde(rename = "locations")]
    pub location: GeoLocation,
    pub gender: Vec<u8>,
    pub age_min: u32,
    pub age_max: u32,
    // Creative data
    pub page: Page,
    pub creative_name: String,
    pub image_hash: String,
    pub media_url: String,
    pub video_id: String,
    pub title: String,
    pub message: String,
    pub call_to_action: CallToAction,
    // Account data
    pub ad_account: String,
}

// ── Remote payloads ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct NewCampaign<'a> {
    name: &'a str,
    objective: &'a str,
    daily_budget: &'a str,
    bid_strategy: &'a str,
    status: &'a str,
    special_ad_categories: &'a [String],
    access_token: &'a str,
}

#[derive(Debug, Serialize)]
struct NewAdSet<'a> {
    name: String,
    billing_event: &'a str,
    campaign_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    promoted_object: Option<PromotedObject<'a>>,
    targeting: &'a TargetingSpec,
    status: &'a str,
    start_time: &'a str,
    end_time: &'a str,
    access_token: &'a str,
}

#[derive(Debug, Serialize)]
struct PromotedObject<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    page_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pixel_id: Option<&'a str>,
}

/// The targeting object sent with each new ad-set: request-level audience
/// bounds plus the chromosome's expressed attribute lists.
#[derive(Debug, Default, Serialize)]
pub(crate) struct TargetingSpec {
    geo_locations: GeoLocation,
    genders: Vec<u8>,
    age_min: u32,
    age_max: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    behaviors: Vec<TargetingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    interests: Vec<TargetingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    life_events: Vec<TargetingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    family_statuses: Vec<TargetingEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    industries: Vec<TargetingEntry>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub(crate) struct TargetingEntry {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct NewCreative<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    title: &'a str,
    name: &'a str,
    status: &'a str,
    object_story_spec: ObjectStorySpec<'a>,
    access_token: &'a str,
}

#[derive(Debug, Serialize)]
struct ObjectStorySpec<'a> {
    page_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_data: Option<LinkData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_data: Option<VideoData<'a>>,
}

#[derive(Debug, Serialize)]
struct LinkData<'a> {
    image_hash: &'a str,
    link: String,
    message: &'a str,
    call_to_action: &'a CallToAction,
}

#[derive(Debug, Serialize)]
struct VideoData<'a> {
    image_hash: &'a str,
    message: &'a str,
    video_id: &'a str,
    call_to_action: &'a CallToAction,
}

#[derive(Debug, Serialize)]
struct NewAd<'a> {
    name: String,
    adset_id: &'a str,
    creative: CreativeRef<'a>,
    status: &'a str,
    access_token: &'a str,
}

#[derive(Debug, Serialize)]
struct CreativeRef<'a> {
    creative_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

// ── Validation ───────────────────────────────────────────────────────────

#[cfg(not(feature = "numeric-budget"))]
fn budget_below_minimum(budget: &str) -> bool {
    // Lexicographic comparison over the decimal string, matching the live
    // validation; see the `numeric-budget` feature for the parsed variant.
    budget.is_empty() || budget < MINIMUM_DAILY_BUDGET
}

#[cfg(feature = "numeric-budget")]
fn budget_below_minimum(budget: &str) -> bool {
    match budget.parse::<f64>() {
        Ok(value) => value < 3000.0,
        Err(_) => true,
    }
}

/// Check every request precondition, in order, before any side effect.
pub fn validate(request: &Request) -> Result<(), RequestError> {
    // Configuration parameters
    if request.segment.is_empty() {
        return Err(RequestError::MissingSegment);
    }
    if !(request.mutation_rate > 0.0 && request.mutation_rate <= 0.20) {
        return Err(RequestError::InvalidMutationRate);
    }
    if request.ad_account.is_empty() {
        return Err(RequestError::MissingAdAccount);
    }

    // Campaign parameters
    if request.name.is_empty() {
        return Err(RequestError::MissingCampaignName);
    }
    if budget_below_minimum(&request.budget) {
        return Err(RequestError::InvalidBudget);
    }
    if request.special_ad_categories.is_none() {
        return Err(RequestError::MissingSpecialAdCategory);
    }
    if request.objective.is_empty() {
        return Err(RequestError::MissingObjective);
    }

    // Ad-set parameters
    if request.start_time.is_empty() {
        return Err(RequestError::MissingStartTime);
    }
    if request.end_time.is_empty() {
        return Err(RequestError::MissingEndTime);
    }
    if request.location == GeoLocation::default() {
        return Err(RequestError::MissingLocation);
    }
    if request.gender.is_empty() {
        return Err(RequestError::MissingGender);
    }
    if request.age_min == 0 || request.age_max == 0 {
        return Err(RequestError::MissingAge);
    }

    // Ads and creative parameters
    if request.page.id.is_empty() {
        return Err(RequestError::MissingPage);
    }
    // A call to action of type NONE is allowed, an absent one is not.
    if request.call_to_action == CallToAction::default() {
        return Err(RequestError::MissingCallToAction);
    }
    if request.creative_name.is_empty() {
        return Err(RequestError::MissingCreativeName);
    }
    if request.image_hash.is_empty() && request.video_id.is_empty() {
        return Err(RequestError::MissingCreativeMedia);
    }

    Ok(())
}

// ── Creator ──────────────────────────────────────────────────────────────

/// Runs the end-to-end creation pipeline.
///
/// ## Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use genetic_campaign_orchestrator::platform::{CampaignCreator, GraphClient};
/// # use genetic_campaign_orchestrator::storage::MemoryStore;
/// # async fn example(auth: impl genetic_campaign_orchestrator::platform::AuthProvider) {
/// let creator = CampaignCreator::new(GraphClient::new(), auth, Arc::new(MemoryStore::new()))
///     .with_status("PAUSED");
/// # }
/// ```
pub struct CampaignCreator<A, S> {
    client: GraphClient,
    auth: A,
    store: Arc<S>,
    sampler: Arc<dyn UniformSampler>,
    status: String,
    billing_event: String,
}

impl<A, S> CampaignCreator<A, S>
where
    A: AuthProvider,
    S: SegmentStore + CampaignStore,
{
    /// Create a creator with the production defaults: objects are created
    /// `ACTIVE` and billed by `IMPRESSIONS`.
    pub fn new(client: GraphClient, auth: A, store: Arc<S>) -> Self {
        Self {
            client,
            auth,
            store,
            sampler: Arc::new(OsSampler),
            status: "ACTIVE".to_string(),
            billing_event: "IMPRESSIONS".to_string(),
        }
    }

    /// Status applied to every created remote object.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Billing event applied to every created ad-set.
    pub fn with_billing_event(mut self, billing_event: impl Into<String>) -> Self {
        self.billing_event = billing_event.into();
        self
    }

    /// Replace the uniform sampler driving mutation and selection.
    pub fn with_sampler(mut self, sampler: Arc<dyn UniformSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Launch one campaign: run a generation over the segment's population
    /// and assemble the downstream platform objects around it.
    ///
    /// # Errors
    ///
    /// Fails fast with the first error encountered; partially created remote
    /// objects are left in place.
    pub async fn create(&self, user_id: &str, request: &Request) -> Result<Campaign, CampaignError> {
        validate(request)?;

        let (account, valid) = self.auth.get_user(user_id).await?;
        if !valid {
            warn!(user = %user_id, "campaign rejected: access token expired or invalid");
            return Err(CampaignError::ExpiredCredentials);
        }

        // The oracle carries this call's token so selection can read
        // insights for every chromosome in the current population.
        let oracle = InsightsOracle::new(self.client.clone())
            .with_access_token(account.access_token.clone());
        let engine = GeneticEngine::new(Arc::new(oracle), self.sampler.clone());

        let campaign_id = self.create_campaign(request, &account.access_token).await?;
        info!(user = %user_id, campaign = %campaign_id, "remote campaign created");

        let initial = self.store.get_segment(user_id, &request.segment).await?;
        let mut population = self
            .next_population(&engine, initial, request.mutation_rate)
            .await?;

        let ad_sets = self
            .create_ad_sets(
                &engine,
                request,
                &campaign_id,
                &account.access_token,
                &mut population,
            )
            .await?;

        self.store
            .set_segment(user_id, &request.segment, &population)
            .await?;

        let creative_id = self.create_creative(request, &account.access_token).await?;
        for ad_set_id in &ad_sets {
            self.create_ad(&request.ad_account, ad_set_id, &creative_id, &account.access_token)
                .await?;
        }

        let campaign = Campaign {
            id: campaign_id,
            budget: request.budget.clone(),
            start_time: request.start_time.clone(),
            end_time: request.end_time.clone(),
            targeting: population,
            media: vec![Media {
                title: request.title.clone(),
                body: request.message.clone(),
                video_id: request.video_id.clone(),
                url: request.media_url.clone(),
                image_hash: request.image_hash.clone(),
            }],
        };
        self.store
            .store_campaign(user_id, "facebook", &request.ad_account, &request.segment, &campaign)
            .await?;

        info!(user = %user_id, campaign = %campaign.id, ad_sets = ad_sets.len(), "campaign stored");
        Ok(campaign)
    }

    /// One generation: fitness over the current population, keep the elite,
    /// refill to [`POPULATION_SIZE`] with mutated clones drawn round-robin
    /// from the elite.
    async fn next_population(
        &self,
        engine: &GeneticEngine,
        mut initial: Vec<Chromosome>,
        mutation_rate: f64,
    ) -> Result<Vec<Chromosome>, CampaignError> {
        engine.fitness(&mut initial).await?;
        let elite = engine.selection(initial, SELECTION_SIZE)?;

        let mut population = elite;
        let mut index = 0;
        while population.len() < POPULATION_SIZE {
            if index == SELECTION_SIZE {
                index = 0;
            }
            let mut clone = population[index].clone();
            engine.mutate(&mut clone, mutation_rate);
            population.push(clone);
            index += 1;
        }

        Ok(population)
    }

    async fn create_campaign(
        &self,
        request: &Request,
        access_token: &str,
    ) -> Result<String, CampaignError> {
        let categories = request.special_ad_categories.clone().unwrap_or_default();
        let payload = NewCampaign {
            name: &request.name,
            objective: &request.objective,
            daily_budget: &request.budget,
            bid_strategy: "LOWEST_COST_WITHOUT_CAP",
            status: &self.status,
            special_ad_categories: &categories,
            access_token,
        };

        let created: Created = self
            .client
            .post(&format!("{}/campaigns", request.ad_account), &payload)
            .await?;
        Ok(created.id)
    }

    /// Create one ad-set per chromosome, in population order, binding each
    /// chromosome to the ad-set created from it.
    async fn create_ad_sets(
        &self,
        engine: &GeneticEngine,
        request: &Request,
        campaign_id: &str,
        access_token: &str,
        population: &mut [Chromosome],
    ) -> Result<Vec<String>, CampaignError> {
        let mut ad_sets = Vec::with_capacity(population.len());
        for chromosome in population.iter_mut() {
            let targeting = build_targeting(request, engine.genesis(chromosome));
            let ad_set_id = self
                .create_ad_set(request, campaign_id, access_token, &targeting)
                .await?;
            chromosome.id = ad_set_id.clone();
            ad_sets.push(ad_set_id);
        }

        Ok(ad_sets)
    }

    async fn create_ad_set(
        &self,
        request: &Request,
        campaign_id: &str,
        access_token: &str,
        targeting: &TargetingSpec,
    ) -> Result<String, CampaignError> {
        let payload = NewAdSet {
            name: random_name(),
            billing_event: &self.billing_event,
            campaign_id,
            promoted_object: promoted_object(request),
            targeting,
            status: &self.status,
            start_time: &request.start_time,
            end_time: &request.end_time,
            access_token,
        };

        let created: Created = self
            .client
            .post(&format!("{}/adsets", request.ad_account), &payload)
            .await?;
        Ok(created.id)
    }

    async fn create_creative(
        &self,
        request: &Request,
        access_token: &str,
    ) -> Result<String, CampaignError> {
        let payload = creative_payload(request, &self.status, access_token);
        let created: Created = self
            .client
            .post(&format!("{}/adcreatives", request.ad_account), &payload)
            .await?;
        Ok(created.id)
    }

    async fn create_ad(
        &self,
        ad_account: &str,
        ad_set_id: &str,
        creative_id: &str,
        access_token: &str,
    ) -> Result<String, CampaignError> {
        let payload = NewAd {
            name: random_name(),
            adset_id: ad_set_id,
            creative: CreativeRef { creative_id },
            status: &self.status,
            access_token,
        };

        let created: Created = self
            .client
            .post(&format!("{ad_account}/ads"), &payload)
            .await?;
        Ok(created.id)
    }
}

/// The object the campaign objective promotes: the page for `PAGE_LIKES`,
/// the pixel for `CONVERSIONS`, nothing otherwise.
fn promoted_object(request: &Request) -> Option<PromotedObject<'_>> {
    match request.objective.as_str() {
        OBJECTIVE_PAGE_LIKES => Some(PromotedObject {
            page_id: Some(&request.page.id),
            pixel_id: None,
        }),
        OBJECTIVE_CONVERSIONS => Some(PromotedObject {
            page_id: None,
            pixel_id: Some(&request.pixel_id),
        }),
        _ => None,
    }
}

fn build_targeting(
    request: &Request,
    mut groups: std::collections::HashMap<TargetingKind, Vec<&Gene>>,
) -> TargetingSpec {
    let mut entries = |kind: TargetingKind| -> Vec<TargetingEntry> {
        groups
            .remove(&kind)
            .unwrap_or_default()
            .into_iter()
            .map(|gene| TargetingEntry {
                id: gene.id.clone(),
                name: gene.name.clone(),
            })
            .collect()
    };

    TargetingSpec {
        geo_locations: request.location.clone(),
        genders: request.gender.clone(),
        age_min: request.age_min,
        age_max: request.age_max,
        behaviors: entries(TargetingKind::Behaviors),
        interests: entries(TargetingKind::Interests),
        life_events: entries(TargetingKind::LifeEvents),
        family_statuses: entries(TargetingKind::FamilyStatuses),
        industries: entries(TargetingKind::Industries),
    }
}

/// Assemble the creative payload. The variants are mutually exclusive and
/// checked in order: video first, then the page-likes link creative, then
/// the generic link creative.
fn creative_payload<'a>(
    request: &'a Request,
    status: &'a str,
    access_token: &'a str,
) -> NewCreative<'a> {
    let title = if request.objective == OBJECTIVE_PAGE_LIKES {
        request.title.as_str()
    } else {
        ""
    };

    let (link_data, video_data) = if !request.video_id.is_empty() {
        (
            None,
            Some(VideoData {
                image_hash: &request.image_hash,
                message: &request.message,
                video_id: &request.video_id,
                call_to_action: &request.call_to_action,
            }),
        )
    } else if request.objective == OBJECTIVE_PAGE_LIKES {
        (
            Some(LinkData {
                image_hash: &request.image_hash,
                link: format!("https://facebook.com/{}", request.page.id),
                message: &request.message,
                call_to_action: &request.call_to_action,
            }),
            None,
        )
    } else {
        (
            Some(LinkData {
                image_hash: &request.image_hash,
                link: request.call_to_action.value.link.clone(),
                message: &request.message,
                call_to_action: &request.call_to_action,
            }),
            None,
        )
    };

    NewCreative {
        title,
        name: &request.creative_name,
        status,
        object_story_spec: ObjectStorySpec {
            page_id: &request.page.id,
            link_data,
            video_data,
        },
        access_token,
    }
}

/// A fresh object name: 15 bytes from the OS CSPRNG, hex-encoded so the
/// name is always valid text.
fn random_name() -> String {
    let mut bytes = [0u8; 15];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
