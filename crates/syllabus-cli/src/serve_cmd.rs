use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use syllabus_core::error::{PlanError, ValidationError};
use syllabus_core::pipeline::{GenerationRequest, Pipeline, generate_plan};
use syllabus_core::plan::{
    PlanWithTasks, SaveOutcome, ValidatedPlan, decode_plan, delete_plan, get_plan_with_tasks,
    list_plans, replace_plan, save_plan, update_plan, validate_plan,
};
use syllabus_core::progress::{CompletionStats, WeekTasks, list_tasks, plan_stats, toggle_task};
use syllabus_db::models::{SavedPlan, Task};

/// Header carrying the authenticated owner id, set by the fronting auth layer.
pub const OWNER_HEADER: &str = "x-owner-id";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub pipeline: Arc<Pipeline>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    existing_id: Option<Uuid>,
}

impl AppError {
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthorized",
            message: format!("missing {OWNER_HEADER} header"),
            existing_id: None,
        }
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        let status = match &err {
            PlanError::TransientUpstream { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PlanError::Extraction(_) | PlanError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PlanError::Conflict { .. } => StatusCode::CONFLICT,
            PlanError::NotFound { .. } => StatusCode::NOT_FOUND,
            PlanError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind = err.kind(), "request failed: {err}");
        }
        let existing_id = match &err {
            PlanError::Conflict { existing_id } => Some(*existing_id),
            _ => None,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
            existing_id,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        PlanError::from(err).into()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            kind: "validation",
            message: rejection.body_text(),
            existing_id: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let mut body = serde_json::json!({ "error": self.message, "kind": self.kind });
        if let Some(id) = self.existing_id {
            body["existing_id"] = serde_json::json!(id);
        }
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Owner extraction
// ---------------------------------------------------------------------------

/// The caller's owner id, from [`OWNER_HEADER`].
pub struct Owner(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or_else(AppError::unauthorized)
    }
}

/// JSON request body whose rejections use the API error shape.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub goal: String,
    pub weeks: u32,
}

/// Body of save, update and replace: the requested goal and week count plus
/// the plan document to store under them.
#[derive(Debug, Deserialize)]
pub struct PlanBody {
    pub goal: String,
    pub weeks: u32,
    pub plan: Value,
}

impl PlanBody {
    fn into_parts(self) -> Result<(GenerationRequest, ValidatedPlan), PlanError> {
        let request = GenerationRequest::new(&self.goal, self.weeks)?;
        let plan = decode_plan(&self.plan)?;
        let plan = validate_plan(plan, request.weeks())?;
        Ok((request, plan))
    }
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub plan_id: Uuid,
    pub exists: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/plans", get(list_plans_handler).post(save_plan_handler))
        .route("/api/plans/generate", post(generate_handler))
        .route(
            "/api/plans/{id}",
            get(get_plan_handler)
                .put(update_plan_handler)
                .delete(delete_plan_handler),
        )
        .route("/api/plans/{id}/replace", post(replace_plan_handler))
        .route("/api/plans/{id}/tasks", get(list_tasks_handler))
        .route("/api/plans/{id}/tasks/{task_id}", put(toggle_task_handler))
        .route("/api/plans/{id}/stats", get(stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("syllabus serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("syllabus serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn generate_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiJson(body): ApiJson<GenerateBody>,
) -> Result<Json<ValidatedPlan>, AppError> {
    let request = GenerationRequest::new(&body.goal, body.weeks)?;
    tracing::info!(%owner_id, goal = request.goal(), weeks = request.weeks(), "generate requested");
    let plan = generate_plan(&state.pipeline, &request).await?;
    Ok(Json(plan))
}

async fn save_plan_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiJson(body): ApiJson<PlanBody>,
) -> Result<(StatusCode, Json<SaveResponse>), AppError> {
    let (request, plan) = body.into_parts()?;
    let outcome = save_plan(&state.pool, &owner_id, &request, &plan).await?;
    let status = match outcome {
        SaveOutcome::Created(_) => StatusCode::CREATED,
        SaveOutcome::Duplicate(_) => StatusCode::OK,
    };
    Ok((
        status,
        Json(SaveResponse {
            plan_id: outcome.plan().id,
            exists: outcome.is_duplicate(),
        }),
    ))
}

async fn list_plans_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> Result<Json<Vec<SavedPlan>>, AppError> {
    Ok(Json(list_plans(&state.pool, &owner_id).await?))
}

async fn get_plan_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanWithTasks>, AppError> {
    Ok(Json(get_plan_with_tasks(&state.pool, &owner_id, id).await?))
}

async fn update_plan_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<PlanBody>,
) -> Result<Json<SavedPlan>, AppError> {
    let (request, plan) = body.into_parts()?;
    Ok(Json(
        update_plan(&state.pool, &owner_id, id, &request, &plan).await?,
    ))
}

async fn delete_plan_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_plan(&state.pool, &owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_plan_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<PlanBody>,
) -> Result<(StatusCode, Json<SaveResponse>), AppError> {
    let (request, plan) = body.into_parts()?;
    let saved = replace_plan(&state.pool, &owner_id, id, &request, &plan).await?;
    Ok((
        StatusCode::CREATED,
        Json(SaveResponse {
            plan_id: saved.id,
            exists: false,
        }),
    ))
}

async fn list_tasks_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WeekTasks>>, AppError> {
    Ok(Json(list_tasks(&state.pool, &owner_id, id).await?))
}

async fn toggle_task_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
    ApiJson(body): ApiJson<ToggleBody>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(
        toggle_task(&state.pool, &owner_id, id, task_id, body.completed).await?,
    ))
}

async fn stats_handler(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionStats>, AppError> {
    Ok(Json(plan_stats(&state.pool, &owner_id, id).await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
