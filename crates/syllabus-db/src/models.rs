use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Plan document (wire shape, stored as JSONB)
// ---------------------------------------------------------------------------

/// A complete study plan: one milestone per week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub weeks: u32,
    pub milestones: Vec<Milestone>,
}

/// One week of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub week: u32,
    pub title: String,
    pub objectives: Vec<String>,
    pub resources: Vec<Resource>,
    pub daily_tasks: Vec<String>,
}

/// A learning resource referenced by a milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
    /// Free-form tag such as "video", "article" or "course".
    #[serde(rename = "type")]
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A plan persisted for one owner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavedPlan {
    pub id: Uuid,
    pub owner_id: String,
    pub goal: String,
    pub weeks: i32,
    #[sqlx(rename = "plan_data")]
    #[serde(rename = "plan_data")]
    pub plan: Json<Plan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One daily task of a saved plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub week_number: i32,
    /// 1-based position within the week, not a weekday.
    pub day_number: i32,
    pub text: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
