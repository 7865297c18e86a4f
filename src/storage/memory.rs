//! In-memory store
//!
//! A `(partition, key)` record map with the sort attributes the production
//! table carries, so every query the traits expose can be answered with the
//! same record shapes and index semantics. Secondary-index queries are
//! answered by filtered scans, which is plenty for a process-local backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;

use crate::entities::{Campaign, Media, PlatformAccount};
use crate::genetic::Chromosome;
use crate::storage::{AccountStore, CampaignStore, SegmentStore, StoreError};

const PARTITION_CAMPAIGNS: &str = "campaigns";
const KEY_SEGMENTS: &str = "segments";
const KEY_ACCOUNT: &str = "facebook";
// The live table's platform attribute is spelled this way; readers depend
// on it.
const ATTR_PLATFORM: &str = "plaform";
const ATTR_NAMES: &str = "names";

#[derive(Debug, Clone, Default)]
struct Record {
    sort: String,
    second_sort: String,
    third_sort: String,
    fourth_sort: String,
    attributes: HashMap<String, Value>,
}

/// Concurrent in-memory implementation of all three store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<(String, String), Record>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn attribute<T: serde::de::DeserializeOwned>(
        record: &Record,
        name: &str,
    ) -> Result<Option<T>, StoreError> {
        match record.attributes.get(name) {
            None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn set_segment(
        &self,
        user_id: &str,
        segment: &str,
        population: &[Chromosome],
    ) -> Result<(), StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }
        if segment.is_empty() {
            return Err(StoreError::MissingKey("segment"));
        }

        let encoded = serde_json::to_value(population)?;
        let mut record = self
            .records
            .entry((user_id.to_string(), KEY_SEGMENTS.to_string()))
            .or_default();
        record.attributes.insert(segment.to_string(), encoded);

        let names = record
            .attributes
            .entry(ATTR_NAMES.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = names {
            list.push(Value::String(segment.to_string()));
        }

        Ok(())
    }

    async fn get_segment(
        &self,
        user_id: &str,
        segment: &str,
    ) -> Result<Vec<Chromosome>, StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }
        if segment.is_empty() {
            return Err(StoreError::MissingKey("segment"));
        }

        let Some(record) = self
            .records
            .get(&(user_id.to_string(), KEY_SEGMENTS.to_string()))
        else {
            return Ok(Vec::new());
        };

        Ok(Self::attribute(&record, segment)?.unwrap_or_default())
    }

    async fn get_segments(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }

        let Some(record) = self
            .records
            .get(&(user_id.to_string(), KEY_SEGMENTS.to_string()))
        else {
            return Ok(Vec::new());
        };

        Ok(Self::attribute(&record, ATTR_NAMES)?.unwrap_or_default())
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn store_campaign(
        &self,
        user_id: &str,
        platform: &str,
        ad_account: &str,
        segment: &str,
        campaign: &Campaign,
    ) -> Result<(), StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }
        if platform.is_empty() {
            return Err(StoreError::MissingKey("platform"));
        }
        if ad_account.is_empty() {
            return Err(StoreError::MissingKey("ad account"));
        }
        if segment.is_empty() {
            return Err(StoreError::MissingKey("segment"));
        }
        if campaign.id.is_empty()
            || campaign.start_time.is_empty()
            || campaign.end_time.is_empty()
            || campaign.budget.is_empty()
            || campaign.targeting.is_empty()
            || campaign.media.is_empty()
        {
            return Err(StoreError::InvalidCampaign);
        }

        let mut attributes = HashMap::new();
        attributes.insert(ATTR_PLATFORM.to_string(), Value::String(platform.into()));
        attributes.insert("segment".to_string(), Value::String(segment.into()));
        attributes.insert("ad_account".to_string(), Value::String(ad_account.into()));
        attributes.insert("id".to_string(), Value::String(campaign.id.clone()));
        attributes.insert(
            "start_time".to_string(),
            Value::String(campaign.start_time.clone()),
        );
        attributes.insert(
            "end_time".to_string(),
            Value::String(campaign.end_time.clone()),
        );
        attributes.insert("budget".to_string(), Value::String(campaign.budget.clone()));
        attributes.insert(
            "targeting".to_string(),
            serde_json::to_value(&campaign.targeting)?,
        );
        attributes.insert("media".to_string(), serde_json::to_value(&campaign.media)?);

        self.records.insert(
            (PARTITION_CAMPAIGNS.to_string(), campaign.id.clone()),
            Record {
                sort: user_id.to_string(),
                second_sort: campaign.end_time.clone(),
                third_sort: format!("{user_id}:{segment}"),
                fourth_sort: platform.to_string(),
                attributes,
            },
        );

        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> Result<Campaign, StoreError> {
        if campaign_id.is_empty() {
            return Err(StoreError::MissingKey("campaign id"));
        }

        let Some(record) = self
            .records
            .get(&(PARTITION_CAMPAIGNS.to_string(), campaign_id.to_string()))
        else {
            return Err(StoreError::NotFound(campaign_id.to_string()));
        };

        Ok(Campaign {
            id: Self::attribute(&record, "id")?.unwrap_or_default(),
            budget: Self::attribute(&record, "budget")?.unwrap_or_default(),
            start_time: Self::attribute(&record, "start_time")?.unwrap_or_default(),
            end_time: Self::attribute(&record, "end_time")?.unwrap_or_default(),
            targeting: Self::attribute::<Vec<Chromosome>>(&record, "targeting")?
                .unwrap_or_default(),
            media: Self::attribute::<Vec<Media>>(&record, "media")?.unwrap_or_default(),
        })
    }

    async fn get_user_campaigns(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, Vec<String>>, StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }

        let mut campaigns: HashMap<String, Vec<String>> = HashMap::new();
        for entry in self.records.iter() {
            let (partition, key) = entry.key();
            if partition == PARTITION_CAMPAIGNS && entry.sort == user_id {
                campaigns
                    .entry(entry.fourth_sort.clone())
                    .or_default()
                    .push(key.clone());
            }
        }

        Ok(campaigns)
    }

    async fn get_active_campaigns(
        &self,
        platform: &str,
    ) -> Result<HashMap<String, Vec<String>>, StoreError> {
        if platform.is_empty() {
            return Err(StoreError::MissingKey("platform"));
        }

        // End times are RFC 3339 strings, so the lexicographic comparison
        // the index performs matches chronological order.
        let cutoff = Utc::now().to_rfc3339();
        let mut campaigns: HashMap<String, Vec<String>> = HashMap::new();
        for entry in self.records.iter() {
            let (partition, key) = entry.key();
            if partition == PARTITION_CAMPAIGNS
                && entry.second_sort.as_str() > cutoff.as_str()
                && entry.fourth_sort == platform
            {
                campaigns
                    .entry(entry.sort.clone())
                    .or_default()
                    .push(key.clone());
            }
        }

        Ok(campaigns)
    }

    async fn get_segment_campaigns(
        &self,
        user_id: &str,
        segment: &str,
    ) -> Result<Vec<String>, StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }
        if segment.is_empty() {
            return Err(StoreError::MissingKey("segment"));
        }

        let index_key = format!("{user_id}:{segment}");
        let mut matches: Vec<(String, String)> = Vec::new();
        for entry in self.records.iter() {
            let (partition, key) = entry.key();
            if partition == PARTITION_CAMPAIGNS && entry.third_sort == index_key {
                matches.push((entry.second_sort.clone(), key.clone()));
            }
        }

        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches.into_iter().map(|(_, key)| key).collect())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn store_account(
        &self,
        user_id: &str,
        account: &PlatformAccount,
    ) -> Result<(), StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }
        if account.access_token.is_empty() {
            return Err(StoreError::MissingAccessToken);
        }

        let encoded = serde_json::to_value(account)?;
        let mut record = self
            .records
            .entry((user_id.to_string(), KEY_ACCOUNT.to_string()))
            .or_default();
        record.attributes.insert("account".to_string(), encoded);

        Ok(())
    }

    async fn get_account(&self, user_id: &str) -> Result<PlatformAccount, StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::MissingKey("user id"));
        }

        let Some(record) = self
            .records
            .get(&(user_id.to_string(), KEY_ACCOUNT.to_string()))
        else {
            return Ok(PlatformAccount::default());
        };

        Ok(Self::attribute(&record, "account")?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(id: &str, end_time: &str) -> Campaign {
        Campaign {
            id: id.into(),
            budget: "5000".into(),
            start_time: "2024-01-01T00:00:00+00:00".into(),
            end_time: end_time.into(),
            targeting: vec![Chromosome::default()],
            media: vec![Media {
                title: "title".into(),
                ..Media::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_segment_round_trip() {
        let store = MemoryStore::new();
        let population = vec![Chromosome {
            id: "adset-1".into(),
            quality: 2.0,
            ..Chromosome::default()
        }];

        store.set_segment("user-1", "gamers", &population).await.unwrap();
        let read = store.get_segment("user-1", "gamers").await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, "adset-1");
        assert_eq!(read[0].quality, 2.0);
    }

    #[tokio::test]
    async fn test_get_segment_missing_reads_back_empty() {
        let store = MemoryStore::new();
        assert!(store.get_segment("user-1", "gamers").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_segment_appends_name_per_write() {
        let store = MemoryStore::new();
        store.set_segment("user-1", "gamers", &[]).await.unwrap();
        store.set_segment("user-1", "parents", &[]).await.unwrap();
        store.set_segment("user-1", "gamers", &[]).await.unwrap();

        // Every write appends; the list is a write log, not a set.
        let names = store.get_segments("user-1").await.unwrap();
        assert_eq!(names, vec!["gamers", "parents", "gamers"]);
    }

    #[tokio::test]
    async fn test_segment_keys_must_be_non_empty() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_segment("", "gamers", &[]).await.unwrap_err(),
            StoreError::MissingKey("user id")
        ));
        assert!(matches!(
            store.get_segment("user-1", "").await.unwrap_err(),
            StoreError::MissingKey("segment")
        ));
    }

    #[tokio::test]
    async fn test_campaign_round_trip() {
        let store = MemoryStore::new();
        let stored = campaign("c-1", "2999-01-01T00:00:00+00:00");
        store
            .store_campaign("user-1", "facebook", "act_1", "gamers", &stored)
            .await
            .unwrap();

        let read = store.get_campaign("c-1").await.unwrap();
        assert_eq!(read.id, "c-1");
        assert_eq!(read.budget, "5000");
        assert_eq!(read.targeting.len(), 1);
        assert_eq!(read.media[0].title, "title");
    }

    #[tokio::test]
    async fn test_get_campaign_absent_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_campaign("missing").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_store_campaign_rejects_incomplete_record() {
        let store = MemoryStore::new();
        let mut incomplete = campaign("c-1", "2999-01-01T00:00:00+00:00");
        incomplete.media.clear();
        assert!(matches!(
            store
                .store_campaign("user-1", "facebook", "act_1", "gamers", &incomplete)
                .await
                .unwrap_err(),
            StoreError::InvalidCampaign
        ));
    }

    #[tokio::test]
    async fn test_user_campaigns_grouped_by_platform() {
        let store = MemoryStore::new();
        store
            .store_campaign(
                "user-1",
                "facebook",
                "act_1",
                "gamers",
                &campaign("c-1", "2999-01-01T00:00:00+00:00"),
            )
            .await
            .unwrap();
        store
            .store_campaign(
                "user-1",
                "instagram",
                "act_1",
                "gamers",
                &campaign("c-2", "2999-01-01T00:00:00+00:00"),
            )
            .await
            .unwrap();
        store
            .store_campaign(
                "user-2",
                "facebook",
                "act_2",
                "gamers",
                &campaign("c-3", "2999-01-01T00:00:00+00:00"),
            )
            .await
            .unwrap();

        let campaigns = store.get_user_campaigns("user-1").await.unwrap();
        assert_eq!(campaigns["facebook"], vec!["c-1"]);
        assert_eq!(campaigns["instagram"], vec!["c-2"]);
        assert!(!campaigns.contains_key("user-2"));
    }

    #[tokio::test]
    async fn test_active_campaigns_filters_past_end_times() {
        let store = MemoryStore::new();
        store
            .store_campaign(
                "user-1",
                "facebook",
                "act_1",
                "gamers",
                &campaign("expired", "2020-01-01T00:00:00+00:00"),
            )
            .await
            .unwrap();
        store
            .store_campaign(
                "user-1",
                "facebook",
                "act_1",
                "gamers",
                &campaign("running", "2999-01-01T00:00:00+00:00"),
            )
            .await
            .unwrap();

        let active = store.get_active_campaigns("facebook").await.unwrap();
        assert_eq!(active["user-1"], vec!["running"]);
    }

    #[tokio::test]
    async fn test_segment_campaigns_sorted_by_end_time_descending() {
        let store = MemoryStore::new();
        store
            .store_campaign(
                "user-1",
                "facebook",
                "act_1",
                "gamers",
                &campaign("older", "2998-01-01T00:00:00+00:00"),
            )
            .await
            .unwrap();
        store
            .store_campaign(
                "user-1",
                "facebook",
                "act_1",
                "gamers",
                &campaign("newer", "2999-01-01T00:00:00+00:00"),
            )
            .await
            .unwrap();
        store
            .store_campaign(
                "user-1",
                "facebook",
                "act_1",
                "other",
                &campaign("unrelated", "2999-06-01T00:00:00+00:00"),
            )
            .await
            .unwrap();

        let ids = store.get_segment_campaigns("user-1", "gamers").await.unwrap();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_store_account_rejects_missing_access_token() {
        let store = MemoryStore::new();
        let account = PlatformAccount {
            id: "fb-1".into(),
            ..PlatformAccount::default()
        };
        assert!(matches!(
            store.store_account("user-1", &account).await.unwrap_err(),
            StoreError::MissingAccessToken
        ));
        assert!(store.get_account("user-1").await.unwrap().id.is_empty());
    }

    #[tokio::test]
    async fn test_account_round_trip_and_missing_default() {
        let store = MemoryStore::new();
        assert!(store.get_account("user-1").await.unwrap().access_token.is_empty());

        let account = PlatformAccount {
            id: "fb-1".into(),
            access_token: "token-1".into(),
            ..PlatformAccount::default()
        };
        store.store_account("user-1", &account).await.unwrap();
        let read = store.get_account("user-1").await.unwrap();
        assert_eq!(read.id, "fb-1");
        assert_eq!(read.access_token, "token-1");
    }
}
