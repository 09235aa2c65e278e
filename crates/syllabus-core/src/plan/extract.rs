//! Pull a plan out of free-form generated text.
//!
//! Generated output may wrap the plan in prose or a fenced code block, so the
//! text is scanned for the first balanced `{ ... }` span that parses as JSON.
//! The scanner tracks brace depth and skips braces inside string literals,
//! honouring backslash escapes. The parsed object is then decoded field by
//! field so shape errors can name the offending path.

use serde_json::{Map, Value};

use syllabus_db::models::{Milestone, Plan, Resource};

use super::validate::{ValidatedPlan, validate_plan};
use crate::error::{ExtractionError, PlanError, ValidationError};

/// Extract, decode and validate the plan embedded in `text`.
pub fn extract_plan(text: &str, requested_weeks: u32) -> Result<ValidatedPlan, PlanError> {
    let (_, value) = find_json_object(text)?;
    let plan = decode_plan(&value)?;
    Ok(validate_plan(plan, requested_weeks)?)
}

/// Find the first balanced `{ ... }` span in `text` that is valid JSON.
///
/// Returns the span and its parsed value. A balanced span that is not JSON
/// (e.g. prose such as `{goal}`) is skipped and scanning resumes after it.
/// A brace that never closes is skipped too, unless the text from it onward
/// is JSON cut off by the end of input, which is reported as
/// [`ExtractionError::Unbalanced`].
pub fn find_json_object(text: &str) -> Result<(&str, Value), ExtractionError> {
    let bytes = text.as_bytes();
    let mut from = 0;
    let mut failure = None;

    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        let Some(end) = balanced_end(bytes, start) else {
            if runs_off_end(&text[start..]) {
                return Err(ExtractionError::Unbalanced { start });
            }
            failure.get_or_insert(ExtractionError::Unbalanced { start });
            from = start + 1;
            continue;
        };
        let candidate = &text[start..end];
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return Ok((candidate, value)),
            Err(e) => {
                if !matches!(failure, Some(ExtractionError::Unbalanced { .. })) {
                    failure = Some(ExtractionError::Malformed {
                        reason: e.to_string(),
                    });
                }
            }
        }
        from = end;
    }

    Err(failure.unwrap_or(ExtractionError::NoObject))
}

/// Whether `candidate` parses as JSON right up to the end of the text.
fn runs_off_end(candidate: &str) -> bool {
    let mut values = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
    matches!(values.next(), Some(Err(e)) if e.is_eof())
}

/// Byte index just past the brace closing the one at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a JSON value into a [`Plan`], naming the first field that is
/// missing, null or of the wrong type.
///
/// Unknown fields are ignored.
pub fn decode_plan(value: &Value) -> Result<Plan, ValidationError> {
    let obj = as_object(value, "plan")?;
    let goal = string_at(obj, "goal", "goal")?;
    let weeks = u32_at(obj, "weeks", "weeks")?;
    let milestones = array_at(obj, "milestones", "milestones")?
        .iter()
        .enumerate()
        .map(|(i, m)| decode_milestone(m, &format!("milestones[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Plan {
        goal,
        weeks,
        milestones,
    })
}

fn decode_milestone(value: &Value, path: &str) -> Result<Milestone, ValidationError> {
    let obj = as_object(value, path)?;
    let week = u32_at(obj, "week", &format!("{path}.week"))?;
    let title = string_at(obj, "title", &format!("{path}.title"))?;
    let objectives = strings_at(obj, "objectives", &format!("{path}.objectives"))?;
    let resources = array_at(obj, "resources", &format!("{path}.resources"))?
        .iter()
        .enumerate()
        .map(|(i, r)| decode_resource(r, &format!("{path}.resources[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;
    let daily_tasks = strings_at(obj, "daily_tasks", &format!("{path}.daily_tasks"))?;

    Ok(Milestone {
        week,
        title,
        objectives,
        resources,
        daily_tasks,
    })
}

fn decode_resource(value: &Value, path: &str) -> Result<Resource, ValidationError> {
    let obj = as_object(value, path)?;
    Ok(Resource {
        title: string_at(obj, "title", &format!("{path}.title"))?,
        url: string_at(obj, "url", &format!("{path}.url"))?,
        kind: string_at(obj, "type", &format!("{path}.type"))?,
    })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "must be an object"))
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, ValidationError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(ValidationError::new(path, "is required")),
        Some(v) => Ok(v),
    }
}

fn string_at(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, ValidationError> {
    required(obj, key, path)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ValidationError::new(path, "must be a string"))
}

fn u32_at(obj: &Map<String, Value>, key: &str, path: &str) -> Result<u32, ValidationError> {
    required(obj, key, path)?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ValidationError::new(path, "must be a non-negative integer"))
}

fn array_at<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Vec<Value>, ValidationError> {
    required(obj, key, path)?
        .as_array()
        .ok_or_else(|| ValidationError::new(path, "must be an array"))
}

fn strings_at(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Vec<String>, ValidationError> {
    array_at(obj, key, path)?
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_str()
                .map(str::to_owned)
                .ok_or_else(|| ValidationError::new(format!("{path}[{i}]"), "must be a string"))
        })
        .collect()
}
