mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;

pub fn create_router(db: Database) -> Router {
    let api = Router::new()
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects", post(handlers::create_project))
        .route("/projects/{id}", get(handlers::get_project))
        .route("/projects/{id}", put(handlers::update_project))
        .route("/projects/{id}", delete(handlers::delete_project))
        // Stages
        .route("/projects/{id}/stages", get(handlers::list_stages))
        .route("/projects/{id}/stages", post(handlers::create_stage))
        .route("/stages/{id}", get(handlers::get_stage))
        .route("/stages/{id}", put(handlers::update_stage))
        .route("/stages/{id}", delete(handlers::delete_stage))
        // Tasks (created under their owning stage)
        .route("/projects/{id}/tasks", get(handlers::list_tasks))
        .route("/stages/{id}/tasks", post(handlers::create_task))
        .route("/tasks/{id}", get(handlers::get_task))
        .route("/tasks/{id}", put(handlers::update_task))
        .route("/tasks/{id}", delete(handlers::delete_task))
        // Resources (created under their owning task)
        .route("/projects/{id}/resources", get(handlers::list_resources))
        .route("/tasks/{id}/resources", post(handlers::create_resource))
        .route("/resources/{id}", get(handlers::get_resource))
        .route("/resources/{id}", put(handlers::update_resource))
        .route("/resources/{id}", delete(handlers::delete_resource))
        // Project-level markups
        .route("/projects/{id}/markups", get(handlers::list_markups))
        .route("/projects/{id}/markups", post(handlers::create_markup))
        .route("/markups/{id}", delete(handlers::delete_markup))
        // Estimate reads
        .route("/projects/{id}/estimate/tree", get(handlers::get_estimate_tree))
        .route("/projects/{id}/estimate/summary", get(handlers::get_estimate_summary))
        .route("/projects/{id}/estimate/export", get(handlers::export_estimate))
        // Unit dictionary
        .route("/units", get(handlers::list_units))
        .route("/units", post(handlers::create_unit))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(db)
}
