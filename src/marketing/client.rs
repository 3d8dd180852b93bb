// ABOUTME: HTTP client for the marketing platform - event publish, profile upsert, list attach
// ABOUTME: Handles the 409 duplicate-profile conflict dance and classifies failures

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

use super::models::{
    EventBody, ListMembersBody, ProfileBody, ProfileConflictResponse, ProfileCreateResponse,
    ProfileQueryResponse,
};
use crate::error::ApiError;
use crate::model::{CustomerIdentity, TransactionRecord};
use crate::sync::EventPublisher;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// API revision the request shapes in this module are written against.
const API_REVISION: &str = "2023-10-15";

pub struct MarketingClient {
    client: Client,
    base_url: String,
    api_key: String,
    list_id: String,
}

impl MarketingClient {
    pub fn new(base_url: &str, api_key: &str, list_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            list_id: list_id.to_string(),
        })
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("revision", API_REVISION)
            .header("Accept", "application/json")
    }

    /// Publish a zero-value test event. Used by `check` to verify the
    /// credentials and reachability without touching real metrics.
    pub async fn check_connection(&self) -> Result<(), ApiError> {
        self.post_event(&EventBody::connection_check()).await
    }

    async fn post_event(&self, body: &EventBody) -> Result<(), ApiError> {
        let url = format!("{}/events/", self.base_url);
        tracing::debug!("Marketing request: POST {}", url);

        let response = self
            .with_headers(self.client.post(&url))
            .json(body)
            .send()
            .await?;

        // 202 means accepted for asynchronous processing; that is this
        // API's normal success answer for events.
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &text));
        }
        Ok(())
    }

    /// Create the profile, or dig its id out of the 409 conflict when it
    /// already exists.
    async fn create_or_find_profile(
        &self,
        identity: &CustomerIdentity,
        record: &TransactionRecord,
    ) -> Result<String, ApiError> {
        let url = format!("{}/profiles/", self.base_url);
        let body = ProfileBody::for_customer(identity, record);

        let response = self
            .with_headers(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            // 202-style empty or odd bodies fall through to the lookup.
            let created: ProfileCreateResponse = response
                .json()
                .await
                .unwrap_or(ProfileCreateResponse { data: None });
            if let Some(resource) = created.data {
                return Ok(resource.id);
            }
        } else if status == StatusCode::CONFLICT {
            let conflict: ProfileConflictResponse = response
                .json()
                .await
                .unwrap_or(ProfileConflictResponse { errors: Vec::new() });
            if let Some(id) = conflict.duplicate_profile_id() {
                tracing::debug!("Profile {} already exists as {}", identity.email, id);
                return Ok(id.to_string());
            }
        } else {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &text));
        }

        self.find_profile_id(&identity.email).await?.ok_or_else(|| {
            ApiError::Permanent(format!(
                "could not resolve a profile id for {}",
                identity.email
            ))
        })
    }

    /// Look a profile up by email: GET /profiles/?filter=equals(email,"...").
    async fn find_profile_id(&self, email: &str) -> Result<Option<String>, ApiError> {
        let url = format!("{}/profiles/", self.base_url);

        let response = self
            .with_headers(self.client.get(&url))
            .query(&[("filter", format!("equals(email,\"{}\")", email))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &text));
        }

        let found: ProfileQueryResponse = response.json().await?;
        Ok(found.data.into_iter().next().map(|resource| resource.id))
    }

    async fn add_profile_to_list(&self, profile_id: &str) -> Result<(), ApiError> {
        let url = format!(
            "{}/lists/{}/relationships/profiles/",
            self.base_url, self.list_id
        );

        let response = self
            .with_headers(self.client.post(&url))
            .json(&ListMembersBody::single(profile_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &text));
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for MarketingClient {
    async fn publish_event(&self, record: &TransactionRecord) -> Result<(), ApiError> {
        self.post_event(&EventBody::for_record(record)).await?;
        tracing::info!("Published {} event for {}", record.kind, record.dedup_key());
        Ok(())
    }

    /// Upsert the customer profile and attach it to the configured list.
    async fn upsert_profile(
        &self,
        identity: &CustomerIdentity,
        record: &TransactionRecord,
    ) -> Result<(), ApiError> {
        let profile_id = self.create_or_find_profile(identity, record).await?;
        self.add_profile_to_list(&profile_id).await?;
        tracing::info!(
            "Added profile {} ({}) to list {}",
            identity.email,
            profile_id,
            self.list_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = MarketingClient::new("https://marketing.example.com/", "key", "LIST1");
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url, "https://marketing.example.com");
    }

    #[test]
    fn test_list_url_shape() {
        let client = MarketingClient::new("https://marketing.example.com", "key", "LIST1").unwrap();
        let url = format!(
            "{}/lists/{}/relationships/profiles/",
            client.base_url, client.list_id
        );
        assert_eq!(
            url,
            "https://marketing.example.com/lists/LIST1/relationships/profiles/"
        );
    }
}
