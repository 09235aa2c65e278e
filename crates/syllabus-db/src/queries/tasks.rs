//! Database query functions for the `tasks` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Task;

/// Insert a task unless `(plan_id, week_number, day_number, text)` already
/// exists. Returns the number of rows inserted (0 or 1).
pub async fn insert_task_if_absent<'e>(
    executor: impl PgExecutor<'e>,
    plan_id: Uuid,
    week_number: i32,
    day_number: i32,
    text: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO tasks (plan_id, week_number, day_number, text) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (plan_id, week_number, day_number, text) DO NOTHING",
    )
    .bind(plan_id)
    .bind(week_number)
    .bind(day_number)
    .bind(text)
    .execute(executor)
    .await
    .with_context(|| {
        format!("failed to insert task week {week_number} day {day_number} for plan {plan_id}")
    })?;

    Ok(result.rows_affected())
}

/// List a plan's tasks in week, then day order.
pub async fn list_tasks_for_plan<'e>(
    executor: impl PgExecutor<'e>,
    plan_id: Uuid,
) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE plan_id = $1 \
         ORDER BY week_number, day_number, text",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list tasks for plan")?;

    Ok(tasks)
}

/// Fetch a single task by ID.
pub async fn get_task<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// Set a task's completion flag.
///
/// Only matches when the task belongs to `plan_id` and that plan belongs to
/// `owner_id`; returns `None` otherwise. Completing stamps `completed_at`
/// with the current time (again, if it was already complete); un-completing
/// clears it.
pub async fn set_task_completion<'e>(
    executor: impl PgExecutor<'e>,
    plan_id: Uuid,
    task_id: Uuid,
    owner_id: &str,
    completed: bool,
) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks t \
         SET completed = $1, \
             completed_at = CASE WHEN $1 THEN now() ELSE NULL END, \
             updated_at = now() \
         FROM plans p \
         WHERE t.id = $2 AND t.plan_id = $3 \
           AND p.id = t.plan_id AND p.owner_id = $4 \
         RETURNING t.*",
    )
    .bind(completed)
    .bind(task_id)
    .bind(plan_id)
    .bind(owner_id)
    .fetch_optional(executor)
    .await
    .context("failed to update task completion")?;

    Ok(task)
}

/// Delete a plan's tasks whose `(week, day, text)` key is not in the given
/// parallel arrays. Returns the number of tasks removed.
pub async fn delete_tasks_not_in<'e>(
    executor: impl PgExecutor<'e>,
    plan_id: Uuid,
    weeks: &[i32],
    days: &[i32],
    texts: &[String],
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM tasks \
         WHERE plan_id = $1 \
           AND (week_number, day_number, text) NOT IN ( \
               SELECT * FROM UNNEST($2::int4[], $3::int4[], $4::text[]) \
           )",
    )
    .bind(plan_id)
    .bind(weeks)
    .bind(days)
    .bind(texts)
    .execute(executor)
    .await
    .context("failed to prune stale tasks")?;

    Ok(result.rows_affected())
}

/// Count a plan's tasks.
pub async fn count_tasks_for_plan<'e>(executor: impl PgExecutor<'e>, plan_id: Uuid) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE plan_id = $1")
        .bind(plan_id)
        .fetch_one(executor)
        .await
        .context("failed to count tasks")?;

    Ok(count)
}
