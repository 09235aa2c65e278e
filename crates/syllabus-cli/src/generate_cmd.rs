//! `syllabus generate`: run the pipeline for a goal and optionally store the
//! result.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use syllabus_core::pipeline::{GenerationRequest, Pipeline, generate_plan};
use syllabus_core::plan::{SaveOutcome, ValidatedPlan, check_duplicate, replace_plan, save_plan};

/// What to do with a freshly generated plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Store {
    /// Print only.
    Nothing,
    /// Save as a new plan unless the owner already has one for this goal.
    Save,
    /// Atomically swap out the given plan.
    Replace(Uuid),
}

pub struct GenerateOptions<'a> {
    pub goal: &'a str,
    pub weeks: u32,
    pub store: Store,
    /// Print the plan as JSON instead of a summary.
    pub json: bool,
}

/// Generate a plan. `pool` must be present unless `options.store` is
/// [`Store::Nothing`].
pub async fn run_generate(
    pipeline: &Pipeline,
    pool: Option<&PgPool>,
    owner_id: &str,
    options: GenerateOptions<'_>,
) -> Result<()> {
    let request = GenerationRequest::new(options.goal, options.weeks)?;

    // No point paying for generation when the save would be a no-op.
    if let (Store::Save, Some(pool)) = (&options.store, pool) {
        if let Some(existing) =
            check_duplicate(pool, owner_id, request.goal(), request.weeks()).await?
        {
            println!(
                "A {}-week plan for {:?} already exists: {}",
                existing.weeks, existing.goal, existing.id
            );
            return Ok(());
        }
    }

    info!(goal = request.goal(), weeks = request.weeks(), "generating plan");
    let plan = generate_plan(pipeline, &request).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_summary(&plan);
    }

    match (options.store, pool) {
        (Store::Nothing, _) => {}
        (Store::Save, Some(pool)) => match save_plan(pool, owner_id, &request, &plan).await? {
            SaveOutcome::Created(saved) => println!("\nSaved plan {}.", saved.id),
            SaveOutcome::Duplicate(saved) => {
                println!("\nA plan for this goal already exists: {}", saved.id)
            }
        },
        (Store::Replace(old_id), Some(pool)) => {
            let saved = replace_plan(pool, owner_id, old_id, &request, &plan).await?;
            println!("\nReplaced plan {old_id} with {}.", saved.id);
        }
        (_, None) => anyhow::bail!("a database connection is required to store the plan"),
    }

    Ok(())
}

fn print_summary(plan: &ValidatedPlan) {
    println!("{} ({} weeks)", plan.goal, plan.weeks);
    for milestone in &plan.milestones {
        println!();
        println!("Week {}: {}", milestone.week, milestone.title);
        for objective in &milestone.objectives {
            println!("  - {objective}");
        }
        for (day, task) in milestone.daily_tasks.iter().enumerate() {
            println!("  day {}: {task}", day + 1);
        }
    }
}
