//! Wire types shared with the Callpool server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub roster: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub alt_phone: Option<String>,
    pub group_label: Option<String>,
    pub status: Option<String>,
    pub holder: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
pub struct AgentTally {
    pub agent_id: String,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct PoolStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    #[serde(default)]
    pub agents: Vec<AgentTally>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimResponse {
    pub item: Option<WorkItem>,
    pub stats: PoolStats,
}

#[derive(Debug, Deserialize)]
pub struct CampaignView {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub stats: PoolStats,
}

#[derive(Debug, Deserialize)]
pub struct RoundTwoResponse {
    pub eligible: i64,
}

#[derive(Debug, Deserialize)]
pub struct ImportSummary {
    pub added: i64,
    pub updated: i64,
    pub skipped: i64,
    pub undo_token: Option<Uuid>,
    pub expires_in_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UndoResponse {
    pub removed: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdateItemBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
