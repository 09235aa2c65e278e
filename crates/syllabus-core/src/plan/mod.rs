//! Plans: extraction from generated text, validation, persistence, and task
//! materialization.

pub mod extract;
pub mod materialize;
pub mod service;
pub mod validate;

pub use extract::{decode_plan, extract_plan, find_json_object};
pub use materialize::{TaskSpec, materialize, materialize_tasks, task_specs};
pub use service::{
    PlanWithTasks, SaveOutcome, check_duplicate, delete_plan, get_plan, get_plan_with_tasks,
    list_plans, purge_owner, replace_plan, save_plan, update_plan,
};
pub use validate::{MAX_WEEKS, ValidatedPlan, validate_plan};
