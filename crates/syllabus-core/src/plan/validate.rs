//! Structural rules every stored plan obeys.

use std::collections::BTreeSet;
use std::ops::Deref;

use serde::Serialize;

use syllabus_db::models::Plan;

use crate::error::ValidationError;

/// Longest plan a request may ask for.
pub const MAX_WEEKS: u32 = 52;

/// A [`Plan`] that passed [`validate_plan`]. Persistence only accepts this
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidatedPlan(Plan);

impl ValidatedPlan {
    pub fn as_plan(&self) -> &Plan {
        &self.0
    }

    pub fn into_inner(self) -> Plan {
        self.0
    }
}

impl Deref for ValidatedPlan {
    type Target = Plan;

    fn deref(&self) -> &Plan {
        &self.0
    }
}

/// Check a decoded plan against the requested week count.
///
/// Checks run in a fixed order and the first failure is returned. The plan
/// is never altered: out-of-order milestones are rejected, not sorted.
pub fn validate_plan(plan: Plan, requested_weeks: u32) -> Result<ValidatedPlan, ValidationError> {
    if plan.goal.trim().is_empty() {
        return Err(ValidationError::new("goal", "must not be empty"));
    }
    if plan.weeks != requested_weeks {
        return Err(ValidationError::new(
            "weeks",
            format!("expected {requested_weeks}, got {}", plan.weeks),
        ));
    }
    if !(1..=MAX_WEEKS).contains(&plan.weeks) {
        return Err(ValidationError::new(
            "weeks",
            format!("must be between 1 and {MAX_WEEKS}, got {}", plan.weeks),
        ));
    }
    if plan.milestones.is_empty() {
        return Err(ValidationError::new("milestones", "must not be empty"));
    }

    for (i, m) in plan.milestones.iter().enumerate() {
        if !(1..=plan.weeks).contains(&m.week) {
            return Err(ValidationError::new(
                format!("milestones[{i}].week"),
                format!("{} is outside 1..={}", m.week, plan.weeks),
            ));
        }
    }

    let mut seen = BTreeSet::new();
    for (i, m) in plan.milestones.iter().enumerate() {
        if !seen.insert(m.week) {
            return Err(ValidationError::new(
                format!("milestones[{i}].week"),
                format!("week {} appears more than once", m.week),
            ));
        }
    }
    if let Some(missing) = (1..=plan.weeks).find(|w| !seen.contains(w)) {
        return Err(ValidationError::new(
            "milestones",
            format!("no milestone for week {missing}"),
        ));
    }

    for (i, pair) in plan.milestones.windows(2).enumerate() {
        if pair[1].week < pair[0].week {
            return Err(ValidationError::new(
                format!("milestones[{}].week", i + 1),
                format!("week {} follows week {}", pair[1].week, pair[0].week),
            ));
        }
    }

    for (i, m) in plan.milestones.iter().enumerate() {
        if m.title.trim().is_empty() {
            return Err(ValidationError::new(
                format!("milestones[{i}].title"),
                "must not be empty",
            ));
        }
    }

    Ok(ValidatedPlan(plan))
}
