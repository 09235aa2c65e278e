//! Task materialization: expand a plan's daily tasks into tracked rows.
//!
//! - [`task_specs`] is the pure expansion: one spec per non-blank daily task,
//!   numbered by its 1-based position in the week.
//! - [`materialize_tasks`] writes those specs on an open connection,
//!   skipping rows that already exist, so it can be re-run safely.
//! - [`materialize`] re-runs the expansion for a stored plan.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use syllabus_db::models::{Plan, Task};
use syllabus_db::queries::{plans as plan_queries, tasks as task_queries};

use crate::error::{PlanError, persistence};

/// One task row to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub week_number: i32,
    pub day_number: i32,
    pub text: String,
}

/// Expand every milestone's `daily_tasks` into task specs.
///
/// Text is trimmed. Blank entries produce no task but still use up their
/// day number, so day numbers always match positions in the plan.
pub fn task_specs(plan: &Plan) -> Vec<TaskSpec> {
    plan.milestones
        .iter()
        .flat_map(|m| {
            m.daily_tasks
                .iter()
                .enumerate()
                .filter_map(move |(i, text)| {
                    let text = text.trim();
                    (!text.is_empty()).then(|| TaskSpec {
                        week_number: m.week as i32,
                        day_number: i as i32 + 1,
                        text: text.to_string(),
                    })
                })
        })
        .collect()
}

/// Create any missing task rows for `plan_id` and return all of its tasks
/// in week, day order.
pub async fn materialize_tasks(
    conn: &mut PgConnection,
    plan: &Plan,
    plan_id: Uuid,
) -> Result<Vec<Task>> {
    let specs = task_specs(plan);
    let mut inserted = 0;
    for spec in &specs {
        inserted += task_queries::insert_task_if_absent(
            &mut *conn,
            plan_id,
            spec.week_number,
            spec.day_number,
            &spec.text,
        )
        .await?;
    }

    let tasks = task_queries::list_tasks_for_plan(&mut *conn, plan_id).await?;
    info!(%plan_id, inserted, total = tasks.len(), "tasks materialized");
    Ok(tasks)
}

/// Re-run materialization for one of `owner_id`'s stored plans.
pub async fn materialize(
    pool: &PgPool,
    owner_id: &str,
    plan_id: Uuid,
) -> Result<Vec<Task>, PlanError> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin transaction")
        .map_err(persistence)?;

    let saved = plan_queries::get_plan_for_owner(&mut *tx, plan_id, owner_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PlanError::not_found(format!("plan {plan_id}")))?;

    let tasks = materialize_tasks(&mut tx, &saved.plan.0, plan_id)
        .await
        .map_err(persistence)?;

    tx.commit()
        .await
        .context("failed to commit transaction")
        .map_err(persistence)?;
    Ok(tasks)
}
