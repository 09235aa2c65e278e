//! CLI handlers for `syllabus plan` subcommands.
//!
//! Implements:
//! - `syllabus plan list`                    -- list the owner's plans
//! - `syllabus plan show <plan-id>`          -- milestones, tasks and progress
//! - `syllabus plan tasks <plan-id>`         -- tasks grouped by week, with ids
//! - `syllabus plan stats <plan-id>`         -- completion stats
//! - `syllabus plan toggle <plan> <task>`    -- mark a task done (or `--undo`)
//! - `syllabus plan materialize <plan-id>`   -- re-create missing tasks
//! - `syllabus plan delete <plan-id>`        -- delete a plan and its tasks
//! - `syllabus plan purge --yes`             -- delete all of the owner's plans

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use syllabus_core::plan::{
    delete_plan, get_plan_with_tasks, list_plans, materialize, purge_owner,
};
use syllabus_core::progress::{
    CompletionStats, WeekTasks, compute_stats, list_tasks, plan_stats, toggle_task,
};
use syllabus_db::models::{SavedPlan, Task};

use crate::PlanCommands;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(
    command: PlanCommands,
    pool: &PgPool,
    owner_id: &str,
) -> Result<()> {
    match command {
        PlanCommands::List => cmd_list(pool, owner_id).await,
        PlanCommands::Show { plan_id } => cmd_show(pool, owner_id, &plan_id).await,
        PlanCommands::Tasks { plan_id } => cmd_tasks(pool, owner_id, &plan_id).await,
        PlanCommands::Stats { plan_id } => cmd_stats(pool, owner_id, &plan_id).await,
        PlanCommands::Toggle {
            plan_id,
            task_id,
            undo,
        } => cmd_toggle(pool, owner_id, &plan_id, &task_id, !undo).await,
        PlanCommands::Materialize { plan_id } => cmd_materialize(pool, owner_id, &plan_id).await,
        PlanCommands::Delete { plan_id } => cmd_delete(pool, owner_id, &plan_id).await,
        PlanCommands::Purge { yes } => cmd_purge(pool, owner_id, yes).await,
    }
}

pub(crate) fn parse_id(kind: &str, raw: &str) -> Result<Uuid> {
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {kind} ID: {raw:?}"))
}

// -----------------------------------------------------------------------
// syllabus plan list
// -----------------------------------------------------------------------

async fn cmd_list(pool: &PgPool, owner_id: &str) -> Result<()> {
    let plans = list_plans(pool, owner_id).await?;

    if plans.is_empty() {
        println!(
            "No plans found. Use `syllabus generate --goal <goal> --weeks <n> --save` to create one."
        );
        return Ok(());
    }

    // ID is always 36 chars (UUID).
    let id_w = 36;
    let goal_w = plans
        .iter()
        .map(|p| p.goal.chars().count())
        .max()
        .unwrap_or(4)
        .clamp(4, 48);
    let weeks_w = 5;

    println!("{:<id_w$}  {:<goal_w$}  {:>weeks_w$}  CREATED", "ID", "GOAL", "WEEKS");
    for plan in &plans {
        let created = plan.created_at.format("%Y-%m-%d %H:%M");
        println!(
            "{:<id_w$}  {:<goal_w$}  {:>weeks_w$}  {}",
            plan.id,
            truncate(&plan.goal, goal_w),
            plan.weeks,
            created,
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// syllabus plan show <plan-id>
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, owner_id: &str, plan_id: &str) -> Result<()> {
    let plan_id = parse_id("plan", plan_id)?;
    let full = get_plan_with_tasks(pool, owner_id, plan_id).await?;
    let all_tasks: Vec<Task> = full
        .tasks_by_week
        .iter()
        .flat_map(|w| w.tasks.iter().cloned())
        .collect();
    let stats = compute_stats(u32::try_from(full.plan.weeks).unwrap_or(0), &all_tasks);

    print_plan_header(&full.plan);
    print_stats(&stats);

    for milestone in &full.plan.plan.milestones {
        println!();
        println!("Week {}: {}", milestone.week, milestone.title);
        for objective in &milestone.objectives {
            println!("  - {objective}");
        }
        if !milestone.resources.is_empty() {
            println!("  Resources:");
            for resource in &milestone.resources {
                println!("    [{}] {} <{}>", resource.kind, resource.title, resource.url);
            }
        }
        let week = full
            .tasks_by_week
            .iter()
            .find(|w| i64::from(w.week_number) == i64::from(milestone.week));
        if let Some(week) = week {
            println!("  Tasks:");
            for task in &week.tasks {
                println!("    {} day {}: {}", checkbox(task), task.day_number, task.text);
            }
        }
    }

    Ok(())
}

fn print_plan_header(plan: &SavedPlan) {
    println!("Plan: {}", plan.goal);
    println!("  ID:        {}", plan.id);
    println!("  Weeks:     {}", plan.weeks);
    println!(
        "  Created:   {}",
        plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if plan.updated_at != plan.created_at {
        println!(
            "  Updated:   {}",
            plan.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

fn print_stats(stats: &CompletionStats) {
    println!(
        "  Progress:  {}/{} tasks ({:.1}%)",
        stats.completed_tasks, stats.total_tasks, stats.percentage
    );
    println!("  Completed weeks: {}", stats.completed_weeks);
    println!("  Current week:    {}", stats.current_week);
}

fn checkbox(task: &Task) -> &'static str {
    if task.completed { "[x]" } else { "[ ]" }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

// -----------------------------------------------------------------------
// syllabus plan tasks / stats / toggle
// -----------------------------------------------------------------------

async fn cmd_tasks(pool: &PgPool, owner_id: &str, plan_id: &str) -> Result<()> {
    let plan_id = parse_id("plan", plan_id)?;
    let weeks = list_tasks(pool, owner_id, plan_id).await?;
    print_week_tasks(&weeks);
    Ok(())
}

fn print_week_tasks(weeks: &[WeekTasks]) {
    if weeks.is_empty() {
        println!("No tasks. Use `syllabus plan materialize <plan-id>` to create them.");
        return;
    }
    for (i, week) in weeks.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("Week {}:", week.week_number);
        for task in &week.tasks {
            println!(
                "  {} {}  day {}: {}",
                checkbox(task),
                task.id,
                task.day_number,
                task.text
            );
        }
    }
}

async fn cmd_stats(pool: &PgPool, owner_id: &str, plan_id: &str) -> Result<()> {
    let plan_id = parse_id("plan", plan_id)?;
    let stats = plan_stats(pool, owner_id, plan_id).await?;
    println!("Plan {plan_id}");
    print_stats(&stats);
    Ok(())
}

async fn cmd_toggle(
    pool: &PgPool,
    owner_id: &str,
    plan_id: &str,
    task_id: &str,
    completed: bool,
) -> Result<()> {
    let plan_id = parse_id("plan", plan_id)?;
    let task_id = parse_id("task", task_id)?;
    let task = toggle_task(pool, owner_id, plan_id, task_id, completed).await?;

    match task.completed_at {
        Some(at) => println!(
            "{} week {} day {}: {} (completed {})",
            checkbox(&task),
            task.week_number,
            task.day_number,
            task.text,
            at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!(
            "{} week {} day {}: {}",
            checkbox(&task),
            task.week_number,
            task.day_number,
            task.text
        ),
    }
    Ok(())
}

// -----------------------------------------------------------------------
// syllabus plan materialize / delete / purge
// -----------------------------------------------------------------------

async fn cmd_materialize(pool: &PgPool, owner_id: &str, plan_id: &str) -> Result<()> {
    let plan_id = parse_id("plan", plan_id)?;
    let tasks = materialize(pool, owner_id, plan_id).await?;
    println!("Plan {plan_id} has {} task(s).", tasks.len());
    Ok(())
}

async fn cmd_delete(pool: &PgPool, owner_id: &str, plan_id: &str) -> Result<()> {
    let plan_id = parse_id("plan", plan_id)?;
    delete_plan(pool, owner_id, plan_id).await?;
    println!("Deleted plan {plan_id}.");
    Ok(())
}

async fn cmd_purge(pool: &PgPool, owner_id: &str, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("refusing to delete every plan of {owner_id:?} without --yes");
    }
    let removed = purge_owner(pool, owner_id).await?;
    println!("Deleted {removed} plan(s) of {owner_id}.");
    Ok(())
}
