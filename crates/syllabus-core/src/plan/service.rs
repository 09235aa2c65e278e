//! Plan service layer.
//!
//! Every write runs in a single database transaction: the plan row and its
//! tasks land together or not at all. An uncommitted transaction rolls back
//! when dropped, so early returns need no explicit cleanup.

use anyhow::Context;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use syllabus_db::models::SavedPlan;
use syllabus_db::queries::{plans as plan_queries, tasks as task_queries};

use super::materialize::{materialize_tasks, task_specs};
use super::validate::ValidatedPlan;
use crate::error::{PlanError, ValidationError, persistence};
use crate::pipeline::GenerationRequest;
use crate::progress::{WeekTasks, group_by_week};

/// Result of [`save_plan`]. A duplicate is a normal outcome, not an error.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Created(SavedPlan),
    /// The owner already holds a plan for this goal and week count.
    Duplicate(SavedPlan),
}

impl SaveOutcome {
    pub fn plan(&self) -> &SavedPlan {
        match self {
            Self::Created(p) | Self::Duplicate(p) => p,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// A stored plan together with its tasks grouped by week.
#[derive(Debug, Clone, Serialize)]
pub struct PlanWithTasks {
    #[serde(flatten)]
    pub plan: SavedPlan,
    pub tasks_by_week: Vec<WeekTasks>,
}

async fn begin(pool: &PgPool) -> Result<Transaction<'static, Postgres>, PlanError> {
    pool.begin()
        .await
        .context("failed to begin transaction")
        .map_err(persistence)
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), PlanError> {
    tx.commit()
        .await
        .context("failed to commit transaction")
        .map_err(persistence)
}

fn plan_not_found(id: Uuid) -> PlanError {
    PlanError::not_found(format!("plan {id}"))
}

/// The `(goal, weeks)` slot a plan is stored under.
///
/// The slot comes from the request, not the plan document, so asking for the
/// same goal again finds the earlier plan even if the generated goal text
/// differs. The plan must cover the requested number of weeks.
fn slot<'a>(
    request: &'a GenerationRequest,
    plan: &ValidatedPlan,
) -> Result<(&'a str, i32), PlanError> {
    if plan.weeks != request.weeks() {
        return Err(ValidationError::new(
            "weeks",
            format!(
                "plan covers {} weeks but {} were requested",
                plan.weeks,
                request.weeks()
            ),
        )
        .into());
    }
    // Requests are bounded to 1..=52 weeks.
    Ok((request.goal(), request.weeks() as i32))
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .is_some_and(|db| db.is_unique_violation())
    })
}

/// Look up the owner's plan for the same goal (case-insensitive, trimmed)
/// and week count.
pub async fn check_duplicate(
    pool: &PgPool,
    owner_id: &str,
    goal: &str,
    weeks: u32,
) -> Result<Option<SavedPlan>, PlanError> {
    let weeks = i32::try_from(weeks).unwrap_or(i32::MAX);
    plan_queries::find_duplicate(pool, owner_id, goal, weeks)
        .await
        .map_err(persistence)
}

/// Store a validated plan and its tasks, unless the owner already holds an
/// equivalent one.
///
/// Concurrent saves of the same goal/weeks are serialised by the unique
/// index: the loser sees the winner's row and reports it as a duplicate.
pub async fn save_plan(
    pool: &PgPool,
    owner_id: &str,
    request: &GenerationRequest,
    plan: &ValidatedPlan,
) -> Result<SaveOutcome, PlanError> {
    let (goal, weeks) = slot(request, plan)?;
    let mut tx = begin(pool).await?;

    if let Some(existing) = plan_queries::find_duplicate(&mut *tx, owner_id, goal, weeks)
        .await
        .map_err(persistence)?
    {
        info!(plan_id = %existing.id, owner_id, "plan already exists");
        return Ok(SaveOutcome::Duplicate(existing));
    }

    let inserted = plan_queries::insert_plan_if_absent(
        &mut *tx,
        owner_id,
        goal,
        weeks,
        plan.as_plan(),
    )
    .await
    .map_err(persistence)?;

    let Some(saved) = inserted else {
        // Lost the race: another save committed the same slot after our
        // check. Its row is visible to the next statement.
        let existing = plan_queries::find_duplicate(&mut *tx, owner_id, goal, weeks)
            .await
            .map_err(persistence)?
            .context("plan insert conflicted but no existing row was found")
            .map_err(persistence)?;
        info!(plan_id = %existing.id, owner_id, "concurrent save won, reporting duplicate");
        return Ok(SaveOutcome::Duplicate(existing));
    };

    let tasks = materialize_tasks(&mut tx, plan.as_plan(), saved.id)
        .await
        .map_err(persistence)?;
    commit(tx).await?;

    info!(plan_id = %saved.id, owner_id, weeks, tasks = tasks.len(), "plan saved");
    Ok(SaveOutcome::Created(saved))
}

/// Atomically swap one of the owner's plans for new content.
///
/// The old row is locked, deleted (its tasks cascade) and a new row with a
/// new id is inserted and materialized, all in one transaction. If any step
/// fails nothing changes. Content that collides with a different plan of
/// the owner is a [`PlanError::Conflict`].
pub async fn replace_plan(
    pool: &PgPool,
    owner_id: &str,
    old_id: Uuid,
    request: &GenerationRequest,
    plan: &ValidatedPlan,
) -> Result<SavedPlan, PlanError> {
    let (goal, weeks) = slot(request, plan)?;
    let mut tx = begin(pool).await?;

    plan_queries::lock_plan_for_owner(&mut *tx, old_id, owner_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| plan_not_found(old_id))?;

    plan_queries::delete_plan(&mut *tx, old_id, owner_id)
        .await
        .map_err(persistence)?;

    if let Some(other) = plan_queries::find_duplicate(&mut *tx, owner_id, goal, weeks)
        .await
        .map_err(persistence)?
    {
        warn!(%old_id, existing_id = %other.id, "replacement collides with another plan");
        return Err(PlanError::Conflict {
            existing_id: other.id,
        });
    }

    let inserted = plan_queries::insert_plan_if_absent(
        &mut *tx,
        owner_id,
        goal,
        weeks,
        plan.as_plan(),
    )
    .await
    .map_err(persistence)?;

    let saved = match inserted {
        Some(saved) => saved,
        None => {
            let other = plan_queries::find_duplicate(&mut *tx, owner_id, goal, weeks)
                .await
                .map_err(persistence)?
                .context("plan insert conflicted but no existing row was found")
                .map_err(persistence)?;
            return Err(PlanError::Conflict {
                existing_id: other.id,
            });
        }
    };

    let tasks = materialize_tasks(&mut tx, plan.as_plan(), saved.id)
        .await
        .map_err(persistence)?;
    commit(tx).await?;

    info!(%old_id, new_id = %saved.id, owner_id, tasks = tasks.len(), "plan replaced");
    Ok(saved)
}

/// Rewrite a plan's content in place, keeping its id.
///
/// Tasks whose `(week, day, text)` no longer appear in the new content are
/// removed; the rest keep their completion state and new ones are added.
pub async fn update_plan(
    pool: &PgPool,
    owner_id: &str,
    plan_id: Uuid,
    request: &GenerationRequest,
    plan: &ValidatedPlan,
) -> Result<SavedPlan, PlanError> {
    let (goal, weeks) = slot(request, plan)?;
    let mut tx = begin(pool).await?;

    if let Some(other) = plan_queries::find_duplicate(&mut *tx, owner_id, goal, weeks)
        .await
        .map_err(persistence)?
        .filter(|other| other.id != plan_id)
    {
        return Err(PlanError::Conflict {
            existing_id: other.id,
        });
    }

    let result = plan_queries::update_plan_content(
        &mut *tx,
        plan_id,
        owner_id,
        goal,
        weeks,
        plan.as_plan(),
    )
    .await;
    let updated = match result {
        Ok(Some(updated)) => updated,
        Ok(None) => return Err(plan_not_found(plan_id)),
        Err(e) if is_unique_violation(&e) => {
            drop(tx);
            let other = plan_queries::find_duplicate(pool, owner_id, goal, weeks)
                .await
                .map_err(persistence)?;
            return Err(match other {
                Some(other) => PlanError::Conflict {
                    existing_id: other.id,
                },
                None => persistence(e),
            });
        }
        Err(e) => return Err(persistence(e)),
    };

    let specs = task_specs(plan.as_plan());
    let week_keys: Vec<i32> = specs.iter().map(|s| s.week_number).collect();
    let day_keys: Vec<i32> = specs.iter().map(|s| s.day_number).collect();
    let text_keys: Vec<String> = specs.into_iter().map(|s| s.text).collect();
    let removed =
        task_queries::delete_tasks_not_in(&mut *tx, plan_id, &week_keys, &day_keys, &text_keys)
            .await
            .map_err(persistence)?;

    let tasks = materialize_tasks(&mut tx, plan.as_plan(), plan_id)
        .await
        .map_err(persistence)?;
    commit(tx).await?;

    info!(%plan_id, owner_id, removed, tasks = tasks.len(), "plan updated");
    Ok(updated)
}

/// Fetch one of the owner's plans.
pub async fn get_plan(pool: &PgPool, owner_id: &str, plan_id: Uuid) -> Result<SavedPlan, PlanError> {
    plan_queries::get_plan_for_owner(pool, plan_id, owner_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| plan_not_found(plan_id))
}

/// The owner's plans, newest first.
pub async fn list_plans(pool: &PgPool, owner_id: &str) -> Result<Vec<SavedPlan>, PlanError> {
    plan_queries::list_plans_for_owner(pool, owner_id)
        .await
        .map_err(persistence)
}

pub async fn get_plan_with_tasks(
    pool: &PgPool,
    owner_id: &str,
    plan_id: Uuid,
) -> Result<PlanWithTasks, PlanError> {
    let plan = get_plan(pool, owner_id, plan_id).await?;
    let tasks = task_queries::list_tasks_for_plan(pool, plan_id)
        .await
        .map_err(persistence)?;
    Ok(PlanWithTasks {
        plan,
        tasks_by_week: group_by_week(tasks),
    })
}

/// Delete one of the owner's plans and, by cascade, its tasks.
pub async fn delete_plan(pool: &PgPool, owner_id: &str, plan_id: Uuid) -> Result<(), PlanError> {
    let deleted = plan_queries::delete_plan(pool, plan_id, owner_id)
        .await
        .map_err(persistence)?;
    if !deleted {
        return Err(plan_not_found(plan_id));
    }
    info!(%plan_id, owner_id, "plan deleted");
    Ok(())
}

/// Delete everything the owner holds. Called when the owner's account goes
/// away. Returns the number of plans removed.
pub async fn purge_owner(pool: &PgPool, owner_id: &str) -> Result<u64, PlanError> {
    let removed = plan_queries::delete_plans_for_owner(pool, owner_id)
        .await
        .map_err(persistence)?;
    info!(owner_id, removed, "owner purged");
    Ok(removed)
}
