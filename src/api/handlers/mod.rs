use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::db::Database;
use crate::error::EstimateError;
use crate::estimate::EstimateSummary;
use crate::export;
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

/// Map a domain error to a status code.
///
/// Validation, not-found and cascade failures carry messages that are safe
/// to expose. Storage errors are logged server-side and sanitized.
fn map_error(e: EstimateError) -> (StatusCode, String) {
    match &e {
        EstimateError::Validation(_) => {
            tracing::warn!("Validation error: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        EstimateError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        EstimateError::Cascade(_) => {
            tracing::error!("Cascade failure: {}", e);
            (StatusCode::CONFLICT, e.to_string())
        }
        EstimateError::Storage(_) => {
            tracing::error!("Internal error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn not_found(entity: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{entity} not found"))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(
    State(db): State<Database>,
) -> Result<Json<Vec<Project>>, (StatusCode, String)> {
    db.get_all_projects().map(Json).map_err(map_error)
}

pub async fn get_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, (StatusCode, String)> {
    db.get_project(id)
        .map_err(map_error)?
        .map(Json)
        .ok_or(not_found("Project"))
}

pub async fn create_project(
    State(db): State<Database>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<Project>), (StatusCode, String)> {
    db.create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(map_error)
}

pub async fn update_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> Result<Json<Project>, (StatusCode, String)> {
    db.update_project(id, input).map(Json).map_err(map_error)
}

pub async fn delete_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    db.delete_project(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(map_error)
}

// ============================================================
// Stages
// ============================================================

pub async fn list_stages(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Stage>>, (StatusCode, String)> {
    db.list_stages(project_id).map(Json).map_err(map_error)
}

pub async fn get_stage(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Stage>, (StatusCode, String)> {
    db.get_stage(id)
        .map_err(map_error)?
        .map(Json)
        .ok_or(not_found("Stage"))
}

pub async fn create_stage(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<CreateStageInput>,
) -> Result<(StatusCode, Json<Stage>), (StatusCode, String)> {
    db.create_stage(project_id, input)
        .map(|s| (StatusCode::CREATED, Json(s)))
        .map_err(map_error)
}

pub async fn update_stage(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateStageInput>,
) -> Result<Json<Stage>, (StatusCode, String)> {
    db.update_stage(id, input).map(Json).map_err(map_error)
}

pub async fn delete_stage(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    db.delete_stage(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(map_error)
}

// ============================================================
// Tasks
// ============================================================

pub async fn list_tasks(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    db.list_tasks(project_id).map(Json).map_err(map_error)
}

pub async fn get_task(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, (StatusCode, String)> {
    db.get_task(id)
        .map_err(map_error)?
        .map(Json)
        .ok_or(not_found("Task"))
}

pub async fn create_task(
    State(db): State<Database>,
    Path(stage_id): Path<Uuid>,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    db.create_task(stage_id, input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(map_error)
}

pub async fn update_task(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTaskInput>,
) -> Result<Json<Task>, (StatusCode, String)> {
    db.update_task(id, input).map(Json).map_err(map_error)
}

pub async fn delete_task(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    db.delete_task(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(map_error)
}

// ============================================================
// Resources
// ============================================================

pub async fn list_resources(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Resource>>, (StatusCode, String)> {
    db.list_resources(project_id).map(Json).map_err(map_error)
}

pub async fn get_resource(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Resource>, (StatusCode, String)> {
    db.get_resource(id)
        .map_err(map_error)?
        .map(Json)
        .ok_or(not_found("Resource"))
}

pub async fn create_resource(
    State(db): State<Database>,
    Path(task_id): Path<Uuid>,
    Json(input): Json<CreateResourceInput>,
) -> Result<(StatusCode, Json<Resource>), (StatusCode, String)> {
    db.create_resource(task_id, input)
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(map_error)
}

pub async fn update_resource(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateResourceInput>,
) -> Result<Json<Resource>, (StatusCode, String)> {
    db.update_resource(id, input).map(Json).map_err(map_error)
}

pub async fn delete_resource(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    db.delete_resource(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(map_error)
}

// ============================================================
// Markups
// ============================================================

pub async fn list_markups(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Markup>>, (StatusCode, String)> {
    db.list_markups(project_id).map(Json).map_err(map_error)
}

pub async fn create_markup(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<CreateMarkupInput>,
) -> Result<(StatusCode, Json<Markup>), (StatusCode, String)> {
    db.create_markup(project_id, input)
        .map(|m| (StatusCode::CREATED, Json(m)))
        .map_err(map_error)
}

pub async fn delete_markup(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    db.delete_markup(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(map_error)
}

// ============================================================
// Estimate reads
// ============================================================

pub async fn get_estimate_tree(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<StageTreeNode>>, (StatusCode, String)> {
    db.get_estimate_tree(project_id)
        .map(Json)
        .map_err(map_error)
}

pub async fn get_estimate_summary(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<EstimateSummary>, (StatusCode, String)> {
    db.get_estimate_summary(project_id)
        .map(Json)
        .map_err(map_error)
}

pub async fn export_estimate(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let forest = db.get_estimate_tree(project_id).map_err(map_error)?;
    let units = db.list_units().map_err(map_error)?;
    let csv = export::estimate_to_csv(&forest, &units);

    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        csv,
    ))
}

// ============================================================
// Units
// ============================================================

pub async fn list_units(
    State(db): State<Database>,
) -> Result<Json<Vec<UnitMeasure>>, (StatusCode, String)> {
    db.list_units().map(Json).map_err(map_error)
}

pub async fn create_unit(
    State(db): State<Database>,
    Json(input): Json<CreateUnitInput>,
) -> Result<(StatusCode, Json<UnitMeasure>), (StatusCode, String)> {
    db.create_unit(input)
        .map(|u| (StatusCode::CREATED, Json(u)))
        .map_err(map_error)
}
