//! HTTP API handlers
//!
//! Handlers stay thin: pull the verified agent identity from the
//! `x-agent-id` header (authentication itself lives upstream), delegate
//! to the store, wrap the result in JSON.

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{async_trait, Json, Router};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit;
use crate::error::{AppError, Result};
use crate::models::{
    Campaign, CampaignView, ClaimResponse, CreateCampaignRequest, ImportRequest, ImportSummary,
    ItemFilters, NewItemRequest, RoundTwoResponse, UndoRequest, UndoResponse, UpdateItemRequest,
    WorkItem,
};
use crate::AppState;

/// Verified caller identity, handed over by the auth layer in front of us
pub struct AgentId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AgentId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get("x-agent-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| AgentId(s.to_string()))
            .ok_or_else(|| AppError::BadRequest("Missing x-agent-id header".to_string()))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/campaigns", post(create_campaign))
        .route("/api/campaigns/:id", get(get_campaign))
        .route("/api/campaigns/:id/start", post(start_campaign))
        .route("/api/campaigns/:id/stop", post(stop_campaign))
        .route("/api/campaigns/:id/join", post(join_campaign))
        .route("/api/campaigns/:id/claim", post(claim_next))
        .route("/api/campaigns/:id/round-two", post(start_round_two))
        .route("/api/campaigns/:id/round-two/claim", post(claim_next_round_two))
        .route("/api/campaigns/:id/items", get(list_items).post(add_item))
        .route("/api/campaigns/:id/import", post(import_batch))
        .route("/api/campaigns/:id/undo-import", post(undo_import))
        .route("/api/items/:id", post(update_item))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn create_campaign(
    State(state): State<Arc<AppState>>,
    AgentId(agent): AgentId,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>> {
    let campaign = state
        .store
        .create_campaign(&req.name, req.scheduled_for, req.ends_at)
        .await?;
    audit::record(
        state.store.pool(),
        Some(campaign.id),
        &agent,
        "create_campaign",
        None,
        Some(&req.name),
    )
    .await;
    Ok(Json(campaign))
}

async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignView>> {
    let campaign = state.store.get_campaign(id).await?;
    let stats = state.store.stats(id).await?;
    Ok(Json(CampaignView { campaign, stats }))
}

async fn start_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
) -> Result<Json<Campaign>> {
    let campaign = state.store.start_campaign(id).await?;
    audit::record(state.store.pool(), Some(id), &agent, "start_campaign", None, None).await;
    Ok(Json(campaign))
}

async fn stop_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
) -> Result<Json<Campaign>> {
    let campaign = state.store.stop_campaign(id).await?;
    audit::record(state.store.pool(), Some(id), &agent, "stop_campaign", None, None).await;
    Ok(Json(campaign))
}

async fn join_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
) -> Result<Json<Campaign>> {
    let campaign = state.store.join_campaign(id, &agent).await?;
    audit::record(state.store.pool(), Some(id), &agent, "join_campaign", None, None).await;
    Ok(Json(campaign))
}

async fn claim_next(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
) -> Result<Json<ClaimResponse>> {
    let item = state.store.claim_next(id, &agent).await?;
    if let Some(item) = &item {
        audit::record(
            state.store.pool(),
            Some(id),
            &agent,
            "claim",
            Some(&item.id.to_string()),
            None,
        )
        .await;
    }
    let stats = state.store.stats(id).await?;
    Ok(Json(ClaimResponse { item, stats }))
}

async fn start_round_two(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
) -> Result<Json<RoundTwoResponse>> {
    let eligible = state.store.start_round_two(id).await?;
    audit::record(
        state.store.pool(),
        Some(id),
        &agent,
        "start_round_two",
        None,
        Some(&eligible.to_string()),
    )
    .await;
    Ok(Json(RoundTwoResponse { eligible }))
}

async fn claim_next_round_two(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
) -> Result<Json<Option<WorkItem>>> {
    let item = state.store.claim_next_round_two(id, &agent).await?;
    if let Some(item) = &item {
        audit::record(
            state.store.pool(),
            Some(id),
            &agent,
            "claim_round_two",
            Some(&item.id.to_string()),
            None,
        )
        .await;
    }
    Ok(Json(item))
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(filters): Query<ItemFilters>,
) -> Result<Json<Vec<WorkItem>>> {
    let items = state.store.list_items(id, &filters).await?;
    Ok(Json(items))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
    Json(req): Json<NewItemRequest>,
) -> Result<Json<WorkItem>> {
    let item = state.store.add_item(id, &req).await?;
    audit::record(
        state.store.pool(),
        Some(id),
        &agent,
        "add_item",
        Some(&item.id.to_string()),
        None,
    )
    .await;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
    Json(patch): Json<UpdateItemRequest>,
) -> Result<Json<WorkItem>> {
    let item = state.store.update_item(id, &agent, &patch).await?;
    audit::record(
        state.store.pool(),
        Some(item.campaign_id),
        &agent,
        "update_item",
        Some(&id.to_string()),
        patch.status.as_ref().and_then(|s| s.as_ref()).map(|o| o.as_str()),
    )
    .await;
    Ok(Json(item))
}

async fn import_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportSummary>> {
    let summary = state.store.import_batch(id, &req.records).await?;
    audit::record(
        state.store.pool(),
        Some(id),
        &agent,
        "import_batch",
        summary.undo_token.map(|t| t.to_string()).as_deref(),
        Some(&format!(
            "added={} updated={} skipped={}",
            summary.added, summary.updated, summary.skipped
        )),
    )
    .await;
    Ok(Json(summary))
}

async fn undo_import(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AgentId(agent): AgentId,
    Json(req): Json<UndoRequest>,
) -> Result<Json<UndoResponse>> {
    let removed = state.store.undo_import(id, req.token).await?;
    audit::record(
        state.store.pool(),
        Some(id),
        &agent,
        "undo_import",
        Some(&req.token.to_string()),
        Some(&removed.to_string()),
    )
    .await;
    Ok(Json(UndoResponse { removed }))
}
