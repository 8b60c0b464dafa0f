//! API integration tests

use axum::body::Body;
use axum::Router;
use callpool::models::{
    Campaign, CampaignView, ClaimResponse, ImportSummary, UndoResponse, WorkItem,
};
use callpool::AppState;
use hyper::{Request, StatusCode};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

async fn setup_app() -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    callpool::api::router(AppState::new(pool))
}

fn post(uri: &str, agent: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-agent-id", agent)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_active_campaign(app: &Router) -> Campaign {
    let response = app
        .clone()
        .oneshot(post("/api/campaigns", "operator", json!({"name": "Evening calls"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let campaign: Campaign = read_json(response).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/start", campaign.id),
            "operator",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

async fn seed_item(app: &Router, campaign: &Campaign, name: &str) -> WorkItem {
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/items", campaign.id),
            "operator",
            json!({"name": name}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_campaign_requires_agent_header() {
    let app = setup_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/campaigns")
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "No header"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_campaign_with_stats() {
    let app = setup_app().await;
    let campaign = create_active_campaign(&app).await;
    seed_item(&app, &campaign, "S1").await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/campaigns/{}", campaign.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view: CampaignView = read_json(response).await;
    assert_eq!(view.stats.total, 1);
    assert_eq!(view.stats.pending, 1);
}

#[tokio::test]
async fn test_get_campaign_not_found() {
    let app = setup_app().await;
    let response = app
        .oneshot(get(&format!("/api/campaigns/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_claim_flow_over_http() {
    let app = setup_app().await;
    let campaign = create_active_campaign(&app).await;
    let s1 = seed_item(&app, &campaign, "S1").await;
    seed_item(&app, &campaign, "S2").await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/claim", campaign.id),
            "leyla",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let claim: ClaimResponse = read_json(response).await;
    let item = claim.item.expect("expected a claimed item");
    assert_eq!(item.id, s1.id);
    assert_eq!(item.holder.as_deref(), Some("leyla"));
    assert_eq!(claim.stats.total, 2);

    // Re-polling returns the same item
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/claim", campaign.id),
            "leyla",
            json!({}),
        ))
        .await
        .unwrap();
    let claim: ClaimResponse = read_json(response).await;
    assert_eq!(claim.item.unwrap().id, s1.id);
}

#[tokio::test]
async fn test_claim_exhausted_pool_is_ok_with_null() {
    let app = setup_app().await;
    let campaign = create_active_campaign(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/claim", campaign.id),
            "leyla",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let claim: ClaimResponse = read_json(response).await;
    assert!(claim.item.is_none());
}

#[tokio::test]
async fn test_claim_on_pending_campaign_conflicts() {
    let app = setup_app().await;
    let response = app
        .clone()
        .oneshot(post("/api/campaigns", "operator", json!({"name": "Not started"})))
        .await
        .unwrap();
    let campaign: Campaign = read_json(response).await;

    let response = app
        .oneshot(post(
            &format!("/api/campaigns/{}/claim", campaign.id),
            "leyla",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_update_item_and_round_two() {
    let app = setup_app().await;
    let campaign = create_active_campaign(&app).await;
    let s1 = seed_item(&app, &campaign, "S1").await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/items/{}", s1.id),
            "leyla",
            json!({"status": "no_answer", "comment": "rang out"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let item: WorkItem = read_json(response).await;
    assert_eq!(item.last_touched_by.as_deref(), Some("leyla"));
    assert_eq!(item.comments.len(), 1);

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/round-two", campaign.id),
            "operator",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = read_json(response).await;
    assert_eq!(body["eligible"], 1);

    // Starting twice conflicts
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/round-two", campaign.id),
            "operator",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(post(
            &format!("/api/campaigns/{}/round-two/claim", campaign.id),
            "tural",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let item: Option<WorkItem> = read_json(response).await;
    assert_eq!(item.unwrap().r2_holder.as_deref(), Some("tural"));
}

#[tokio::test]
async fn test_update_unknown_item_not_found() {
    let app = setup_app().await;
    let response = app
        .oneshot(post(
            &format!("/api/items/{}", uuid::Uuid::new_v4()),
            "leyla",
            json!({"status": "present"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_import_and_undo_over_http() {
    let app = setup_app().await;
    let campaign = create_active_campaign(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/import", campaign.id),
            "operator",
            json!({"records": [
                {"name": "Ali Veliyev", "phone": "(055) 123-45-67"},
                {"name": "  "}
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary: ImportSummary = read_json(response).await;
    assert_eq!(summary.added, 1);
    assert_eq!(summary.skipped, 1);
    let token = summary.undo_token.unwrap();

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/undo-import", campaign.id),
            "operator",
            json!({"token": token}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let undo: UndoResponse = read_json(response).await;
    assert_eq!(undo.removed, 1);

    // Consumed token is gone
    let response = app
        .oneshot(post(
            &format!("/api/campaigns/{}/undo-import", campaign.id),
            "operator",
            json!({"token": token}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_list_items_with_status_filter() {
    let app = setup_app().await;
    let campaign = create_active_campaign(&app).await;
    let s1 = seed_item(&app, &campaign, "S1").await;
    seed_item(&app, &campaign, "S2").await;

    app.clone()
        .oneshot(post(
            &format!("/api/items/{}", s1.id),
            "leyla",
            json!({"status": "present"}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/campaigns/{}/items?status=pending",
            campaign.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let items: Vec<WorkItem> = read_json(response).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "S2");
}

#[tokio::test]
async fn test_stop_campaign_blocks_further_mutation() {
    let app = setup_app().await;
    let campaign = create_active_campaign(&app).await;
    let s1 = seed_item(&app, &campaign, "S1").await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/campaigns/{}/stop", campaign.id),
            "operator",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/items/{}", s1.id),
            "leyla",
            json!({"status": "present"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Stats stay readable
    let response = app
        .oneshot(get(&format!("/api/campaigns/{}", campaign.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_join_activates_pending_campaign() {
    let app = setup_app().await;
    let response = app
        .clone()
        .oneshot(post("/api/campaigns", "operator", json!({"name": "Joinable"})))
        .await
        .unwrap();
    let campaign: Campaign = read_json(response).await;

    let response = app
        .oneshot(post(
            &format!("/api/campaigns/{}/join", campaign.id),
            "leyla",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let joined: Campaign = read_json(response).await;
    assert_eq!(joined.roster, vec!["leyla".to_string()]);
}
