//! Completion tracking for materialized tasks.
//!
//! Completion is stored per task; everything else here is derived from the
//! task list on demand and never persisted.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use syllabus_db::models::Task;
use syllabus_db::queries::{plans as plan_queries, tasks as task_queries};

use crate::error::{PlanError, persistence};

/// Progress through a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    /// `completed / total * 100`, unrounded; `0.0` for a plan with no tasks.
    pub percentage: f64,
    /// Weeks that have tasks, all of them complete.
    pub completed_weeks: u32,
    /// Lowest week with an incomplete task, or `weeks + 1` when nothing is
    /// left.
    pub current_week: u32,
}

/// The tasks of one week, in day order.
#[derive(Debug, Clone, Serialize)]
pub struct WeekTasks {
    pub week_number: i32,
    pub tasks: Vec<Task>,
}

/// Derive completion stats for a plan of `weeks` weeks.
pub fn compute_stats(weeks: u32, tasks: &[Task]) -> CompletionStats {
    let total_tasks = tasks.len();
    let completed_tasks = tasks.iter().filter(|t| t.completed).count();
    let percentage = if total_tasks == 0 {
        0.0
    } else {
        completed_tasks as f64 * 100.0 / total_tasks as f64
    };

    let mut per_week: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
    for task in tasks {
        let entry = per_week.entry(task.week_number).or_default();
        entry.0 += 1;
        if task.completed {
            entry.1 += 1;
        }
    }
    let completed_weeks = per_week
        .values()
        .filter(|(total, done)| *total > 0 && done == total)
        .count() as u32;

    let current_week = tasks
        .iter()
        .filter(|t| !t.completed)
        .map(|t| t.week_number)
        .min()
        .and_then(|w| u32::try_from(w).ok())
        .unwrap_or(weeks + 1);

    CompletionStats {
        total_tasks,
        completed_tasks,
        percentage,
        completed_weeks,
        current_week,
    }
}

/// Group tasks by week, ordered by week then day.
pub fn group_by_week(tasks: Vec<Task>) -> Vec<WeekTasks> {
    let mut weeks: BTreeMap<i32, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        weeks.entry(task.week_number).or_default().push(task);
    }
    weeks
        .into_iter()
        .map(|(week_number, mut tasks)| {
            tasks.sort_by(|a, b| (a.day_number, &a.text).cmp(&(b.day_number, &b.text)));
            WeekTasks { week_number, tasks }
        })
        .collect()
}

/// Mark a task complete or incomplete.
///
/// The task must belong to `plan_id` and the plan to `owner_id`. Marking an
/// already complete task complete again refreshes `completed_at`.
pub async fn toggle_task(
    pool: &PgPool,
    owner_id: &str,
    plan_id: Uuid,
    task_id: Uuid,
    completed: bool,
) -> Result<Task, PlanError> {
    let task = task_queries::set_task_completion(pool, plan_id, task_id, owner_id, completed)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PlanError::not_found(format!("task {task_id} in plan {plan_id}")))?;

    info!(%plan_id, %task_id, completed, "task toggled");
    Ok(task)
}

/// Completion stats for one of the owner's plans.
pub async fn plan_stats(
    pool: &PgPool,
    owner_id: &str,
    plan_id: Uuid,
) -> Result<CompletionStats, PlanError> {
    let plan = plan_queries::get_plan_for_owner(pool, plan_id, owner_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PlanError::not_found(format!("plan {plan_id}")))?;
    let tasks = task_queries::list_tasks_for_plan(pool, plan_id)
        .await
        .map_err(persistence)?;

    let weeks = u32::try_from(plan.weeks).unwrap_or(0);
    Ok(compute_stats(weeks, &tasks))
}

/// The tasks of one of the owner's plans, grouped by week.
pub async fn list_tasks(
    pool: &PgPool,
    owner_id: &str,
    plan_id: Uuid,
) -> Result<Vec<WeekTasks>, PlanError> {
    plan_queries::get_plan_for_owner(pool, plan_id, owner_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PlanError::not_found(format!("plan {plan_id}")))?;
    let tasks = task_queries::list_tasks_for_plan(pool, plan_id)
        .await
        .map_err(persistence)?;
    Ok(group_by_week(tasks))
}
