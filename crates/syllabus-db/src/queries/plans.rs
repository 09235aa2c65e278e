//! Database query functions for the `plans` table.
//!
//! Every function takes any Postgres executor so the service layer can run
//! them against the pool or inside an open transaction.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{Plan, SavedPlan};

/// Find the owner's plan for the same goal (case-insensitive) and week count.
pub async fn find_duplicate<'e>(
    executor: impl PgExecutor<'e>,
    owner_id: &str,
    goal: &str,
    weeks: i32,
) -> Result<Option<SavedPlan>> {
    let plan = sqlx::query_as::<_, SavedPlan>(
        "SELECT * FROM plans \
         WHERE owner_id = $1 AND lower(goal) = lower($2) AND weeks = $3",
    )
    .bind(owner_id)
    .bind(goal.trim())
    .bind(weeks)
    .fetch_optional(executor)
    .await
    .context("failed to look up duplicate plan")?;

    Ok(plan)
}

/// Insert a plan row unless the owner already holds the same goal/weeks slot.
///
/// Returns `None` when the unique index on `(owner_id, lower(goal), weeks)`
/// rejected the row, which includes losing a race against a concurrent
/// insert of the same slot.
pub async fn insert_plan_if_absent<'e>(
    executor: impl PgExecutor<'e>,
    owner_id: &str,
    goal: &str,
    weeks: i32,
    plan: &Plan,
) -> Result<Option<SavedPlan>> {
    let saved = sqlx::query_as::<_, SavedPlan>(
        "INSERT INTO plans (owner_id, goal, weeks, plan_data) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT DO NOTHING \
         RETURNING *",
    )
    .bind(owner_id)
    .bind(goal.trim())
    .bind(weeks)
    .bind(Json(plan))
    .fetch_optional(executor)
    .await
    .context("failed to insert plan")?;

    Ok(saved)
}

/// Fetch a plan by ID regardless of owner.
pub async fn get_plan<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Option<SavedPlan>> {
    let plan = sqlx::query_as::<_, SavedPlan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Fetch a plan by ID only if it belongs to `owner_id`.
pub async fn get_plan_for_owner<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    owner_id: &str,
) -> Result<Option<SavedPlan>> {
    let plan =
        sqlx::query_as::<_, SavedPlan>("SELECT * FROM plans WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch plan")?;

    Ok(plan)
}

/// Like [`get_plan_for_owner`], but takes a row lock until the surrounding
/// transaction ends.
pub async fn lock_plan_for_owner<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    owner_id: &str,
) -> Result<Option<SavedPlan>> {
    let plan = sqlx::query_as::<_, SavedPlan>(
        "SELECT * FROM plans WHERE id = $1 AND owner_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(executor)
    .await
    .context("failed to lock plan")?;

    Ok(plan)
}

/// List an owner's plans, newest first.
pub async fn list_plans_for_owner<'e>(
    executor: impl PgExecutor<'e>,
    owner_id: &str,
) -> Result<Vec<SavedPlan>> {
    let plans = sqlx::query_as::<_, SavedPlan>(
        "SELECT * FROM plans WHERE owner_id = $1 ORDER BY created_at DESC, id",
    )
    .bind(owner_id)
    .fetch_all(executor)
    .await
    .context("failed to list plans")?;

    Ok(plans)
}

/// Overwrite a plan's content in place. Returns `None` if the plan does not
/// exist for this owner.
///
/// Fails with a unique violation if the new goal/weeks collide with another
/// of the owner's plans.
pub async fn update_plan_content<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    owner_id: &str,
    goal: &str,
    weeks: i32,
    plan: &Plan,
) -> Result<Option<SavedPlan>> {
    let saved = sqlx::query_as::<_, SavedPlan>(
        "UPDATE plans \
         SET goal = $1, weeks = $2, plan_data = $3, updated_at = now() \
         WHERE id = $4 AND owner_id = $5 \
         RETURNING *",
    )
    .bind(goal.trim())
    .bind(weeks)
    .bind(Json(plan))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(executor)
    .await
    .context("failed to update plan")?;

    Ok(saved)
}

/// Delete one of the owner's plans; its tasks go with it. Returns whether a
/// row was removed.
pub async fn delete_plan<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    owner_id: &str,
) -> Result<bool> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(executor)
        .await
        .context("failed to delete plan")?;

    Ok(result.rows_affected() > 0)
}

/// Delete every plan held by an owner. Returns the number of plans removed.
pub async fn delete_plans_for_owner<'e>(
    executor: impl PgExecutor<'e>,
    owner_id: &str,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM plans WHERE owner_id = $1")
        .bind(owner_id)
        .execute(executor)
        .await
        .context("failed to delete plans for owner")?;

    Ok(result.rows_affected())
}
