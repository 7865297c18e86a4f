//! Insights-backed quality oracle
//!
//! Quality of a chromosome is derived from the lifetime performance of the
//! ad-set it backs: for every insights row, reach times unique CTR over CPM,
//! normalized by the row's day span, averaged across rows. An ad-set with no
//! insights yet scores zero.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::genetic::{Chromosome, QualityError, QualityOracle};
use crate::platform::client::{ClientError, GraphClient};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors specific to the insights oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle was asked for quality before credentials were supplied.
    #[error("no access token has been supplied to the insights oracle")]
    MissingCredentials,

    /// The insights request itself failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A row field did not parse as the expected number or date.
    #[error("unable to parse insights field {field}: {value:?}")]
    Parse {
        /// Which field failed.
        field: &'static str,
        /// The raw value received.
        value: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct InsightsResponse {
    #[serde(default)]
    data: Vec<InsightsRow>,
}

/// One aggregate row; metrics arrive string-encoded.
#[derive(Debug, Default, Deserialize)]
struct InsightsRow {
    #[serde(default)]
    reach: String,
    #[serde(default)]
    cpm: String,
    #[serde(default)]
    unique_ctr: String,
    #[serde(default)]
    date_start: String,
    #[serde(default)]
    date_stop: String,
}

/// Quality oracle backed by the ad-set insights endpoint.
///
/// One oracle is constructed per orchestrator call with that call's access
/// token; oracles are never shared across users.
#[derive(Debug, Clone)]
pub struct InsightsOracle {
    client: GraphClient,
    access_token: Option<String>,
}

impl InsightsOracle {
    /// Create an oracle without credentials. Quality queries fail with
    /// [`OracleError::MissingCredentials`] until a token is supplied.
    pub fn new(client: GraphClient) -> Self {
        Self {
            client,
            access_token: None,
        }
    }

    /// Supply the access token insights are fetched with.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    async fn compute(&self, chromosome: &Chromosome) -> Result<f64, OracleError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(OracleError::MissingCredentials)?;

        let response: InsightsResponse = self
            .client
            .get(
                &format!("{}/insights", chromosome.id),
                &[
                    ("access_token", token),
                    ("date_preset", "lifetime"),
                    ("fields", "reach,unique_ctr,cpm,date_start,date_stop"),
                ],
            )
            .await?;

        if response.data.is_empty() {
            return Ok(0.0);
        }

        let mut quality = 0.0;
        for row in &response.data {
            let start = parse_date("date_start", &row.date_start)?;
            let stop = parse_date("date_stop", &row.date_stop)?;
            let reach = parse_metric("reach", &row.reach)?;
            let unique_ctr = parse_metric("unique_ctr", &row.unique_ctr)?;
            let cpm = parse_metric("cpm", &row.cpm)?;

            let days = (stop - start).num_days() as f64;
            quality += (reach * unique_ctr / cpm) / days;
        }

        Ok(quality / response.data.len() as f64)
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, OracleError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| OracleError::Parse {
        field,
        value: value.to_string(),
    })
}

fn parse_metric(field: &'static str, value: &str) -> Result<f64, OracleError> {
    value.parse::<f64>().map_err(|_| OracleError::Parse {
        field,
        value: value.to_string(),
    })
}

#[async_trait]
impl QualityOracle for InsightsOracle {
    async fn quality(&self, chromosome: &Chromosome) -> Result<f64, QualityError> {
        Ok(self.compute(chromosome).await?)
    }
}
