//! Best-effort audit sink for mutating operations
//!
//! Every mutating endpoint records who did what to which record. The
//! audit write must never fail the operation it describes: errors are
//! logged and swallowed.

use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn record(
    pool: &SqlitePool,
    campaign_id: Option<Uuid>,
    actor: &str,
    action: &str,
    target: Option<&str>,
    detail: Option<&str>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (campaign_id, actor, action, target, detail, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(campaign_id.map(|id| id.to_string()))
    .bind(actor)
    .bind(action)
    .bind(target)
    .bind(detail)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(action, actor, "audit write failed: {}", e);
    }
}
