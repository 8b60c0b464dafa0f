//! Database store for campaigns and work items
//!
//! All coordination happens through single-record conditional UPDATEs:
//! SQLite executes each statement atomically, so a claim is a
//! select-candidate / compare-and-swap loop with no extra locking layer.
//! Writes never span more than one work item.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::import::ImportRecord;
use crate::models::{
    AgentTally, Campaign, CampaignStatus, Comment, ImportSummary, ItemFilters, NewItemRequest,
    Outcome, PoolStats, Score, UpdateItemRequest, WorkItem,
};

/// Tunable durations; tests shrink these instead of sleeping
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// How long an unfinished claim stays exclusive
    pub lock_timeout: Duration,
    /// How long an import batch can be undone
    pub undo_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::minutes(15),
            undo_ttl: Duration::minutes(10),
        }
    }
}

const ITEM_COLUMNS: &str = "id, campaign_id, name, phone, alt_phone, student_no, group_label, \
     score_kind, score_number, score_text, attendance, homework, status, holder, claimed_at, \
     r2_eligible, r2_holder, r2_claimed_at, last_touched_by, batch_id, imported_at, \
     created_at, updated_at";

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    config: StoreConfig,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, StoreConfig::default())
    }

    pub fn with_config(pool: SqlitePool, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // Campaign lifecycle

    pub async fn create_campaign(
        &self,
        name: &str,
        scheduled_for: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<Campaign> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO campaigns (id, name, scheduled_for, status, ends_at, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(scheduled_for)
        .bind(ends_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Campaign {
            id,
            name: name.to_string(),
            scheduled_for,
            status: CampaignStatus::Pending,
            ends_at,
            round_two_started_at: None,
            roster: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a campaign, lazily completing it when its scheduled end has
    /// elapsed. Every gated operation goes through here first.
    pub async fn get_campaign(&self, id: Uuid) -> Result<Campaign> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, name, scheduled_for, status, ends_at, round_two_started_at,
                   created_at, updated_at
            FROM campaigns
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Campaign {} not found", id)))?;

        let mut campaign: Campaign = row.try_into()?;

        if campaign.status == CampaignStatus::Active {
            if let Some(ends_at) = campaign.ends_at {
                if ends_at <= Utc::now() {
                    sqlx::query(
                        r#"
                        UPDATE campaigns SET status = 'completed', updated_at = ?
                        WHERE id = ? AND status = 'active'
                        "#,
                    )
                    .bind(Utc::now())
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await?;
                    campaign.status = CampaignStatus::Completed;
                    tracing::info!(campaign_id = %id, "campaign reached scheduled end");
                }
            }
        }

        let roster: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT agent_id FROM campaign_roster WHERE campaign_id = ? ORDER BY rowid ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        campaign.roster = roster.into_iter().map(|(a,)| a).collect();

        Ok(campaign)
    }

    pub async fn start_campaign(&self, id: Uuid) -> Result<Campaign> {
        let campaign = self.get_campaign(id).await?;
        if campaign.status != CampaignStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is {}, cannot start",
                id,
                campaign.status.as_str()
            )));
        }

        sqlx::query(
            r#"
            UPDATE campaigns SET status = 'active', updated_at = ? WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get_campaign(id).await
    }

    pub async fn stop_campaign(&self, id: Uuid) -> Result<Campaign> {
        let campaign = self.get_campaign(id).await?;
        if campaign.status != CampaignStatus::Active {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is {}, cannot stop",
                id,
                campaign.status.as_str()
            )));
        }

        sqlx::query(
            r#"
            UPDATE campaigns SET status = 'completed', updated_at = ? WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get_campaign(id).await
    }

    /// Add an agent to the campaign roster. The first join moves a
    /// pending campaign to active.
    pub async fn join_campaign(&self, id: Uuid, agent_id: &str) -> Result<Campaign> {
        let campaign = self.get_campaign(id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is completed",
                id
            )));
        }

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO campaign_roster (campaign_id, agent_id, joined_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(agent_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if campaign.status == CampaignStatus::Pending {
            sqlx::query(
                r#"
                UPDATE campaigns SET status = 'active', updated_at = ? WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        }

        self.get_campaign(id).await
    }

    // Work item access

    pub async fn get_item(&self, id: Uuid) -> Result<WorkItem> {
        let sql = format!("SELECT {} FROM items WHERE id = ?", ITEM_COLUMNS);
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;

        self.hydrate(row).await
    }

    pub async fn add_item(&self, campaign_id: Uuid, req: &NewItemRequest) -> Result<WorkItem> {
        let campaign = self.get_campaign(campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is completed",
                campaign_id
            )));
        }
        let name = crate::import::normalize_name(&req.name)
            .ok_or_else(|| AppError::BadRequest("Item name must not be blank".to_string()))?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let (score_kind, score_number, score_text) = score_columns(req.score.as_ref());

        sqlx::query(
            r#"
            INSERT INTO items (id, campaign_id, name, phone, alt_phone, student_no, group_label,
                               score_kind, score_number, score_text, attendance, homework,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(campaign_id.to_string())
        .bind(&name)
        .bind(req.phone.as_deref().and_then(crate::import::normalize_phone))
        .bind(req.alt_phone.as_deref().and_then(crate::import::normalize_phone))
        .bind(&req.student_no)
        .bind(&req.group_label)
        .bind(score_kind)
        .bind(score_number)
        .bind(score_text)
        .bind(&req.attendance)
        .bind(&req.homework)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_item(id).await
    }

    pub async fn list_items(&self, campaign_id: Uuid, filters: &ItemFilters) -> Result<Vec<WorkItem>> {
        // Ensure the campaign exists so an unknown id is a 404, not an empty list
        self.get_campaign(campaign_id).await?;

        let mut sql = format!(
            "SELECT {} FROM items WHERE campaign_id = ?",
            ITEM_COLUMNS
        );

        let mut status_bind: Option<&'static str> = None;
        if let Some(status) = filters.status.as_deref() {
            if status == "pending" {
                sql.push_str(" AND status IS NULL");
            } else {
                let outcome: Outcome = status
                    .parse()
                    .map_err(|e: String| AppError::BadRequest(e))?;
                sql.push_str(" AND status = ?");
                status_bind = Some(outcome.as_str());
            }
        }
        if filters.holder.is_some() {
            sql.push_str(" AND holder = ?");
        }
        if let Some(eligible) = filters.r2_eligible {
            if eligible {
                sql.push_str(" AND r2_eligible = 1");
            } else {
                sql.push_str(" AND r2_eligible = 0");
            }
        }
        sql.push_str(" ORDER BY rowid ASC");

        let mut query = sqlx::query_as::<_, ItemRow>(&sql).bind(campaign_id.to_string());
        if let Some(s) = status_bind {
            query = query.bind(s);
        }
        if let Some(holder) = filters.holder.as_deref() {
            query = query.bind(holder);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(self.hydrate(row).await?);
        }
        Ok(items)
    }

    // Assignment engine (round one)

    /// Hand one unclaimed pending item to the agent, or return the item
    /// the agent already holds. None means the pool is exhausted or
    /// fully locked by others, which is a normal steady-state result.
    pub async fn claim_next(&self, campaign_id: Uuid, agent_id: &str) -> Result<Option<WorkItem>> {
        let campaign = self.get_campaign(campaign_id).await?;
        if campaign.status != CampaignStatus::Active {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is {}, claims require an active campaign",
                campaign_id,
                campaign.status.as_str()
            )));
        }

        // Idempotent re-entry: a re-polling agent gets its current item back
        let sql = format!(
            "SELECT {} FROM items WHERE campaign_id = ? AND holder = ? AND status IS NULL \
             ORDER BY rowid ASC LIMIT 1",
            ITEM_COLUMNS
        );
        if let Some(row) = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(campaign_id.to_string())
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(Some(self.hydrate(row).await?));
        }

        loop {
            let cutoff = Utc::now() - self.config.lock_timeout;
            let candidate: Option<(String,)> = sqlx::query_as(
                r#"
                SELECT id FROM items
                WHERE campaign_id = ? AND status IS NULL
                  AND (holder IS NULL OR claimed_at <= ?)
                ORDER BY rowid ASC
                LIMIT 1
                "#,
            )
            .bind(campaign_id.to_string())
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .await?;

            let Some((item_id,)) = candidate else {
                return Ok(None);
            };

            // Compare-and-swap: the predicate is re-checked inside the
            // UPDATE, so a concurrent winner leaves us with zero rows
            let result = sqlx::query(
                r#"
                UPDATE items SET holder = ?, claimed_at = ?, updated_at = ?
                WHERE id = ? AND status IS NULL
                  AND (holder IS NULL OR claimed_at <= ?)
                "#,
            )
            .bind(agent_id)
            .bind(Utc::now())
            .bind(Utc::now())
            .bind(&item_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                let id = Uuid::parse_str(&item_id)
                    .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?;
                tracing::debug!(campaign_id = %campaign_id, item_id = %id, agent = agent_id, "claimed item");
                return Ok(Some(self.get_item(id).await?));
            }
            // Lost the race for this candidate; scan again
        }
    }

    // Round-two controller

    /// Freeze the round-two pool to the items currently at no_answer.
    /// Returns the eligible count.
    pub async fn start_round_two(&self, campaign_id: Uuid) -> Result<i64> {
        let campaign = self.get_campaign(campaign_id).await?;
        if campaign.status != CampaignStatus::Active {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is {}, round two requires an active campaign",
                campaign_id,
                campaign.status.as_str()
            )));
        }
        if campaign.round_two_started_at.is_some() {
            return Err(AppError::InvalidState(format!(
                "Round two already started for campaign {}",
                campaign_id
            )));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE campaigns SET round_two_started_at = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(campaign_id.to_string())
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE items SET r2_eligible = 1, r2_holder = NULL, r2_claimed_at = NULL, updated_at = ?
            WHERE campaign_id = ? AND status = 'no_answer'
            "#,
        )
        .bind(now)
        .bind(campaign_id.to_string())
        .execute(&self.pool)
        .await?;

        let eligible = result.rows_affected() as i64;
        tracing::info!(campaign_id = %campaign_id, eligible, "round two started");
        Ok(eligible)
    }

    /// Same claim protocol as round one, scoped to the frozen round-two
    /// pool and operating on the round-two lock fields. An item whose
    /// status has moved off no_answer since activation is done and is
    /// not handed out again.
    pub async fn claim_next_round_two(
        &self,
        campaign_id: Uuid,
        agent_id: &str,
    ) -> Result<Option<WorkItem>> {
        let campaign = self.get_campaign(campaign_id).await?;
        if campaign.status != CampaignStatus::Active {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is {}, claims require an active campaign",
                campaign_id,
                campaign.status.as_str()
            )));
        }

        let sql = format!(
            "SELECT {} FROM items WHERE campaign_id = ? AND r2_holder = ? \
             AND r2_eligible = 1 AND status = 'no_answer' ORDER BY rowid ASC LIMIT 1",
            ITEM_COLUMNS
        );
        if let Some(row) = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(campaign_id.to_string())
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(Some(self.hydrate(row).await?));
        }

        loop {
            let cutoff = Utc::now() - self.config.lock_timeout;
            let candidate: Option<(String,)> = sqlx::query_as(
                r#"
                SELECT id FROM items
                WHERE campaign_id = ? AND r2_eligible = 1 AND status = 'no_answer'
                  AND (r2_holder IS NULL OR r2_claimed_at <= ?)
                ORDER BY rowid ASC
                LIMIT 1
                "#,
            )
            .bind(campaign_id.to_string())
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .await?;

            let Some((item_id,)) = candidate else {
                return Ok(None);
            };

            let result = sqlx::query(
                r#"
                UPDATE items SET r2_holder = ?, r2_claimed_at = ?, updated_at = ?
                WHERE id = ? AND r2_eligible = 1 AND status = 'no_answer'
                  AND (r2_holder IS NULL OR r2_claimed_at <= ?)
                "#,
            )
            .bind(agent_id)
            .bind(Utc::now())
            .bind(Utc::now())
            .bind(&item_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                let id = Uuid::parse_str(&item_id)
                    .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?;
                return Ok(Some(self.get_item(id).await?));
            }
        }
    }

    // Completion tracker

    /// Apply a patch to an item. No ownership check: any caller may
    /// update any item, which supports admin overrides and hand-offs.
    pub async fn update_item(
        &self,
        item_id: Uuid,
        agent_id: &str,
        patch: &UpdateItemRequest,
    ) -> Result<WorkItem> {
        let item = self.get_item(item_id).await?;
        let campaign = self.get_campaign(item.campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is completed",
                item.campaign_id
            )));
        }

        let now = Utc::now();

        // One item, one transaction: either the whole patch lands or
        // none of it does
        let mut tx = self.pool.begin().await?;

        if let Some(status) = &patch.status {
            sqlx::query(
                r#"
                UPDATE items SET status = ?, updated_at = ? WHERE id = ?
                "#,
            )
            .bind(status.as_ref().map(|o| o.as_str()))
            .bind(now)
            .bind(item_id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        if patch.attendance.is_some() || patch.homework.is_some() {
            sqlx::query(
                r#"
                UPDATE items SET attendance = COALESCE(?, attendance),
                                 homework = COALESCE(?, homework),
                                 updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&patch.attendance)
            .bind(&patch.homework)
            .bind(now)
            .bind(item_id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        if let Some(body) = patch.comment.as_deref() {
            sqlx::query(
                r#"
                INSERT INTO item_comments (id, item_id, author, body, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(item_id.to_string())
            .bind(agent_id)
            .bind(body)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Leaderboard accounting happens even for comment-only updates
        sqlx::query(
            r#"
            UPDATE items SET last_touched_by = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(agent_id)
        .bind(now)
        .bind(item_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_item(item_id).await
    }

    // Import/undo manager

    /// Merge a roster batch into the pool. Matched items get their
    /// contact fields refreshed but keep their status and claim state;
    /// unmatched records become new pending items tagged with a fresh
    /// batch id. Malformed records are skipped, never fatal.
    pub async fn import_batch(
        &self,
        campaign_id: Uuid,
        records: &[ImportRecord],
    ) -> Result<ImportSummary> {
        let campaign = self.get_campaign(campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Campaign {} is completed",
                campaign_id
            )));
        }

        let batch_id = Uuid::new_v4();
        let now = Utc::now();
        let mut added = 0i64;
        let mut updated = 0i64;
        let mut skipped = 0i64;

        for record in records {
            let Some(norm) = record.normalize() else {
                skipped += 1;
                continue;
            };

            let mut existing: Option<(String,)> = None;
            for phone in [norm.phone.as_deref(), norm.alt_phone.as_deref()]
                .into_iter()
                .flatten()
            {
                existing = sqlx::query_as(
                    r#"
                    SELECT id FROM items
                    WHERE campaign_id = ? AND (phone = ? OR alt_phone = ?)
                    ORDER BY rowid ASC LIMIT 1
                    "#,
                )
                .bind(campaign_id.to_string())
                .bind(phone)
                .bind(phone)
                .fetch_optional(&self.pool)
                .await?;
                if existing.is_some() {
                    break;
                }
            }
            if existing.is_none() {
                existing = sqlx::query_as(
                    r#"
                    SELECT id FROM items
                    WHERE campaign_id = ? AND LOWER(name) = LOWER(?)
                    ORDER BY rowid ASC LIMIT 1
                    "#,
                )
                .bind(campaign_id.to_string())
                .bind(&norm.name)
                .fetch_optional(&self.pool)
                .await?;
            }

            match existing {
                Some((item_id,)) => {
                    // Contact/identity refresh only; status and both
                    // locks stay untouched
                    let (score_kind, score_number, score_text) =
                        score_columns(norm.score.as_ref());
                    sqlx::query(
                        r#"
                        UPDATE items SET
                            name = ?,
                            phone = COALESCE(?, phone),
                            alt_phone = COALESCE(?, alt_phone),
                            student_no = COALESCE(?, student_no),
                            group_label = COALESCE(?, group_label),
                            score_kind = COALESCE(?, score_kind),
                            score_number = COALESCE(?, score_number),
                            score_text = COALESCE(?, score_text),
                            attendance = COALESCE(?, attendance),
                            homework = COALESCE(?, homework),
                            updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&norm.name)
                    .bind(&norm.phone)
                    .bind(&norm.alt_phone)
                    .bind(&norm.student_no)
                    .bind(&norm.group_label)
                    .bind(score_kind)
                    .bind(score_number)
                    .bind(score_text)
                    .bind(&norm.attendance)
                    .bind(&norm.homework)
                    .bind(now)
                    .bind(&item_id)
                    .execute(&self.pool)
                    .await?;
                    updated += 1;
                }
                None => {
                    let (score_kind, score_number, score_text) =
                        score_columns(norm.score.as_ref());
                    sqlx::query(
                        r#"
                        INSERT INTO items (id, campaign_id, name, phone, alt_phone, student_no,
                                           group_label, score_kind, score_number, score_text,
                                           attendance, homework, batch_id, imported_at,
                                           created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(campaign_id.to_string())
                    .bind(&norm.name)
                    .bind(&norm.phone)
                    .bind(&norm.alt_phone)
                    .bind(&norm.student_no)
                    .bind(&norm.group_label)
                    .bind(score_kind)
                    .bind(score_number)
                    .bind(score_text)
                    .bind(&norm.attendance)
                    .bind(&norm.homework)
                    .bind(batch_id.to_string())
                    .bind(now)
                    .bind(now)
                    .bind(now)
                    .execute(&self.pool)
                    .await?;
                    added += 1;
                }
            }
        }

        // The undo token only exists when something was added; its
        // expiry is persisted so it survives restarts
        let (undo_token, expires_in_ms) = if added > 0 {
            let expires_at = now + self.config.undo_ttl;
            sqlx::query(
                r#"
                INSERT INTO import_batches (id, campaign_id, added, updated, expires_at, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(batch_id.to_string())
            .bind(campaign_id.to_string())
            .bind(added)
            .bind(updated)
            .bind(expires_at)
            .bind(now)
            .execute(&self.pool)
            .await?;
            (Some(batch_id), Some(self.config.undo_ttl.num_milliseconds()))
        } else {
            (None, None)
        };

        tracing::info!(campaign_id = %campaign_id, added, updated, skipped, "import batch applied");

        Ok(ImportSummary {
            added,
            updated,
            skipped,
            undo_token,
            expires_in_ms,
        })
    }

    /// Remove exactly the items a batch added. Updates the batch applied
    /// to pre-existing items are not reverted. A consumed or expired
    /// token fails with ExpiredToken; an unknown one with NotFound.
    pub async fn undo_import(&self, campaign_id: Uuid, token: Uuid) -> Result<i64> {
        let batch = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, campaign_id, added, updated, expires_at, consumed_at, created_at
            FROM import_batches
            WHERE id = ? AND campaign_id = ?
            "#,
        )
        .bind(token.to_string())
        .bind(campaign_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown undo token {}", token)))?;

        let now = Utc::now();

        // Consume the token first. The conditional UPDATE is the only
        // gate: of two concurrent undos with the same token exactly one
        // flips consumed_at, the other lands here with zero rows and
        // fails before any delete runs.
        let claimed = sqlx::query(
            r#"
            UPDATE import_batches SET consumed_at = ?
            WHERE id = ? AND campaign_id = ? AND consumed_at IS NULL AND expires_at > ?
            "#,
        )
        .bind(now)
        .bind(token.to_string())
        .bind(campaign_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            let reason = if batch.consumed_at.is_some() {
                format!("Undo token {} already consumed", token)
            } else {
                format!("Undo window for batch {} has closed", token)
            };
            return Err(AppError::ExpiredToken(reason));
        }

        sqlx::query(
            r#"
            DELETE FROM item_comments
            WHERE item_id IN (SELECT id FROM items WHERE batch_id = ?)
            "#,
        )
        .bind(token.to_string())
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            DELETE FROM items WHERE batch_id = ? AND campaign_id = ?
            "#,
        )
        .bind(token.to_string())
        .bind(campaign_id.to_string())
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected() as i64;
        tracing::info!(campaign_id = %campaign_id, batch = %token, removed, "import batch undone");
        Ok(removed)
    }

    // Stats aggregator

    /// Read-only pool summary; may lag in-flight claims, which is fine
    pub async fn stats(&self, campaign_id: Uuid) -> Result<PoolStats> {
        let (total, completed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN status IS NOT NULL THEN 1 ELSE 0 END), 0)
            FROM items WHERE campaign_id = ?
            "#,
        )
        .bind(campaign_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let tallies: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT last_touched_by, COUNT(*) AS n
            FROM items
            WHERE campaign_id = ? AND last_touched_by IS NOT NULL
            GROUP BY last_touched_by
            ORDER BY n DESC, MIN(rowid) ASC
            "#,
        )
        .bind(campaign_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(PoolStats {
            total,
            completed,
            pending: total - completed,
            agents: tallies
                .into_iter()
                .map(|(agent_id, count)| AgentTally { agent_id, count })
                .collect(),
        })
    }

    // Row hydration

    async fn hydrate(&self, row: ItemRow) -> Result<WorkItem> {
        let mut item: WorkItem = row.try_into()?;
        let comments = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, item_id, author, body, created_at
            FROM item_comments
            WHERE item_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(item.id.to_string())
        .fetch_all(&self.pool)
        .await?;
        item.comments = comments
            .into_iter()
            .map(|c| c.try_into())
            .collect::<Result<Vec<_>>>()?;
        Ok(item)
    }
}

fn score_columns(score: Option<&Score>) -> (Option<&'static str>, Option<f64>, Option<String>) {
    match score {
        Some(Score::Number(n)) => (Some("number"), Some(*n), None),
        Some(Score::Text(t)) => (Some("text"), None, Some(t.clone())),
        Some(Score::Absent) | None => (None, None, None),
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: String,
    name: String,
    scheduled_for: Option<chrono::DateTime<Utc>>,
    status: String,
    ends_at: Option<chrono::DateTime<Utc>>,
    round_two_started_at: Option<chrono::DateTime<Utc>>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = AppError;

    fn try_from(row: CampaignRow) -> Result<Self> {
        Ok(Campaign {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            name: row.name,
            scheduled_for: row.scheduled_for,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid campaign status: {}", e)))?,
            ends_at: row.ends_at,
            round_two_started_at: row.round_two_started_at,
            roster: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    campaign_id: String,
    name: String,
    phone: Option<String>,
    alt_phone: Option<String>,
    student_no: Option<String>,
    group_label: Option<String>,
    score_kind: Option<String>,
    score_number: Option<f64>,
    score_text: Option<String>,
    attendance: Option<String>,
    homework: Option<String>,
    status: Option<String>,
    holder: Option<String>,
    claimed_at: Option<chrono::DateTime<Utc>>,
    r2_eligible: bool,
    r2_holder: Option<String>,
    r2_claimed_at: Option<chrono::DateTime<Utc>>,
    last_touched_by: Option<String>,
    batch_id: Option<String>,
    imported_at: Option<chrono::DateTime<Utc>>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl TryFrom<ItemRow> for WorkItem {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self> {
        let score = match (row.score_kind.as_deref(), row.score_number, row.score_text) {
            (Some("number"), Some(n), _) => Score::Number(n),
            (Some("text"), _, Some(t)) => Score::Text(t),
            (None, _, _) => Score::Absent,
            (kind, _, _) => {
                return Err(AppError::Internal(format!(
                    "Inconsistent score columns: kind={:?}",
                    kind
                )))
            }
        };

        Ok(WorkItem {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            campaign_id: Uuid::parse_str(&row.campaign_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            name: row.name,
            phone: row.phone,
            alt_phone: row.alt_phone,
            student_no: row.student_no,
            group_label: row.group_label,
            score,
            attendance: row.attendance,
            homework: row.homework,
            status: row
                .status
                .map(|s| s.parse())
                .transpose()
                .map_err(|e| AppError::Internal(format!("Invalid outcome: {}", e)))?,
            holder: row.holder,
            claimed_at: row.claimed_at,
            r2_eligible: row.r2_eligible,
            r2_holder: row.r2_holder,
            r2_claimed_at: row.r2_claimed_at,
            last_touched_by: row.last_touched_by,
            batch_id: row
                .batch_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| AppError::Internal(format!("Invalid batch UUID: {}", e)))?,
            imported_at: row.imported_at,
            comments: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    #[allow(dead_code)]
    item_id: String,
    author: String,
    body: String,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = AppError;

    fn try_from(row: CommentRow) -> Result<Self> {
        Ok(Comment {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            author: row.author,
            body: row.body,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    campaign_id: String,
    #[allow(dead_code)]
    added: i64,
    #[allow(dead_code)]
    updated: i64,
    #[allow(dead_code)]
    expires_at: chrono::DateTime<Utc>,
    consumed_at: Option<chrono::DateTime<Utc>>,
    #[allow(dead_code)]
    created_at: chrono::DateTime<Utc>,
}
