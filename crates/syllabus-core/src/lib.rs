//! Domain logic for syllabus: the generation pipeline, plan extraction and
//! validation, persistence workflows, and progress tracking.

pub mod error;
pub mod pipeline;
pub mod plan;
pub mod progress;

pub use error::{ExtractionError, PlanError, ValidationError};
