//! HTTP client for the Callpool server

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::messages::{
    Campaign, CampaignView, ClaimResponse, ImportSummary, RoundTwoResponse, UndoResponse,
    UpdateItemBody, WorkItem,
};

/// Thin typed wrapper over the server's JSON API. Every call carries
/// the agent identity header.
pub struct PoolClient {
    http: reqwest::Client,
    base: String,
    agent: String,
}

impl PoolClient {
    pub fn new(base: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            agent: agent.into(),
        }
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base, path))
            .header("x-agent-id", &self.agent)
            .json(&body)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base, path))
            .header("x-agent-id", &self.agent)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "request rejected: {}", body);
            return Err(anyhow!("server returned {}: {}", status, body));
        }
        Ok(response.json().await?)
    }

    pub async fn join(&self, campaign: Uuid) -> Result<Campaign> {
        self.post(&format!("/api/campaigns/{}/join", campaign), json!({}))
            .await
    }

    pub async fn claim(&self, campaign: Uuid) -> Result<ClaimResponse> {
        self.post(&format!("/api/campaigns/{}/claim", campaign), json!({}))
            .await
    }

    pub async fn claim_round_two(&self, campaign: Uuid) -> Result<Option<WorkItem>> {
        self.post(
            &format!("/api/campaigns/{}/round-two/claim", campaign),
            json!({}),
        )
        .await
    }

    pub async fn start_round_two(&self, campaign: Uuid) -> Result<RoundTwoResponse> {
        self.post(&format!("/api/campaigns/{}/round-two", campaign), json!({}))
            .await
    }

    pub async fn update_item(&self, item: Uuid, body: &UpdateItemBody) -> Result<WorkItem> {
        self.post(&format!("/api/items/{}", item), serde_json::to_value(body)?)
            .await
    }

    pub async fn import(
        &self,
        campaign: Uuid,
        records: serde_json::Value,
    ) -> Result<ImportSummary> {
        self.post(
            &format!("/api/campaigns/{}/import", campaign),
            json!({ "records": records }),
        )
        .await
    }

    pub async fn undo_import(&self, campaign: Uuid, token: Uuid) -> Result<UndoResponse> {
        self.post(
            &format!("/api/campaigns/{}/undo-import", campaign),
            json!({ "token": token }),
        )
        .await
    }

    pub async fn campaign(&self, campaign: Uuid) -> Result<CampaignView> {
        self.get(&format!("/api/campaigns/{}", campaign)).await
    }
}
