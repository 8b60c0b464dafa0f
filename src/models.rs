//! Data models for campaigns and work items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A campaign is one bounded call session with its own pool of work items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub status: CampaignStatus,
    /// When set, the campaign auto-completes once this instant has passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_two_started_at: Option<DateTime<Utc>>,
    /// Agents that have joined this campaign
    pub roster: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a campaign; completed is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Active,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Active => "active",
            CampaignStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CampaignStatus::Pending),
            "active" => Ok(CampaignStatus::Active),
            "completed" => Ok(CampaignStatus::Completed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Call outcome recorded against a work item; absence of one means pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Present,
    Absent,
    NoAnswer,
    WrongNumber,
    Callback,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Present => "present",
            Outcome::Absent => "absent",
            Outcome::NoAnswer => "no_answer",
            Outcome::WrongNumber => "wrong_number",
            Outcome::Callback => "callback",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Outcome::Present),
            "absent" => Ok(Outcome::Absent),
            "no_answer" => Ok(Outcome::NoAnswer),
            "wrong_number" => Ok(Outcome::WrongNumber),
            "callback" => Ok(Outcome::Callback),
            _ => Err(format!("Invalid outcome: {}", s)),
        }
    }
}

/// A student score, which the source data carries as either a number or
/// free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Number(f64),
    Text(String),
    Absent,
}

impl Default for Score {
    fn default() -> Self {
        Score::Absent
    }
}

/// A timestamped comment on a work item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// One unit of callable work: a student record with claim state for
/// round one and round two
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_label: Option<String>,
    pub score: Score,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homework: Option<String>,
    /// Recorded outcome; None means the item is still pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Outcome>,
    /// Round-one claim holder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    /// Member of the round-two pool (fixed at round-two activation)
    pub r2_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2_holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2_claimed_at: Option<DateTime<Utc>>,
    /// Last agent to update this item, for the leaderboard
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_touched_by: Option<String>,
    /// Import batch this item came from; the undo key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only pool summary for a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    /// Per-agent tallies, descending by count
    pub agents: Vec<AgentTally>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTally {
    pub agent_id: String,
    pub count: i64,
}

// Request/response types for the HTTP API

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewItemRequest {
    pub name: String,
    pub phone: Option<String>,
    pub alt_phone: Option<String>,
    pub student_no: Option<String>,
    pub group_label: Option<String>,
    pub score: Option<Score>,
    pub attendance: Option<String>,
    pub homework: Option<String>,
}

/// Patch applied by updateItem; every field is optional
#[derive(Debug, Default, Deserialize)]
pub struct UpdateItemRequest {
    /// Outcome to set; `Some(None)` clears the status back to pending
    #[serde(default, with = "double_option")]
    pub status: Option<Option<Outcome>>,
    pub comment: Option<String>,
    pub attendance: Option<String>,
    pub homework: Option<String>,
}

/// Distinguishes "field absent" from "field present but null" so a
/// caller can explicitly clear the status
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<WorkItem>,
    pub stats: PoolStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub stats: PoolStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoundTwoResponse {
    pub eligible: i64,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub records: Vec<crate::import::ImportRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportSummary {
    pub added: i64,
    pub updated: i64,
    pub skipped: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_token: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UndoRequest {
    pub token: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UndoResponse {
    pub removed: i64,
}

/// Filters accepted by the item listing endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ItemFilters {
    /// An outcome name, or the literal "pending" for unresolved items
    pub status: Option<String>,
    pub holder: Option<String>,
    pub r2_eligible: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_status_round_trip() {
        for s in ["pending", "active", "completed"] {
            let parsed: CampaignStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("closed".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_outcome_round_trip() {
        for s in ["present", "absent", "no_answer", "wrong_number", "callback"] {
            let parsed: Outcome = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("maybe".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_score_serialization() {
        let json = serde_json::to_string(&Score::Number(17.5)).unwrap();
        assert!(json.contains("number"));
        assert!(json.contains("17.5"));

        let json = serde_json::to_string(&Score::Text("excused".to_string())).unwrap();
        assert!(json.contains("text"));
        assert!(json.contains("excused"));

        let json = serde_json::to_string(&Score::Absent).unwrap();
        assert!(json.contains("absent"));
    }

    #[test]
    fn test_score_default_is_absent() {
        assert_eq!(Score::default(), Score::Absent);
    }

    #[test]
    fn test_update_request_status_variants() {
        // absent
        let req: UpdateItemRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert!(req.status.is_none());

        // present with value
        let req: UpdateItemRequest =
            serde_json::from_str(r#"{"status": "present"}"#).unwrap();
        assert_eq!(req.status, Some(Some(Outcome::Present)));

        // present but null: explicit clear
        let req: UpdateItemRequest = serde_json::from_str(r#"{"status": null}"#).unwrap();
        assert_eq!(req.status, Some(None));
    }
}
