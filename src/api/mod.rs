//! HTTP API.
//!
//! Two route families share one router: the board routes under
//! `/api/projects` return plain JSON with canonical enum spellings, and the
//! agent routes under `/api/agent` wrap every response in an
//! `{ "ok": true, "data": ... }` envelope and accept relaxed enum input.

mod agent;
mod attachments;
mod changelog;
mod error;
mod extract;
mod features;
mod milestones;
mod projects;
mod subtasks;
pub mod validate;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use crate::db::Database;
use crate::models::*;
use crate::uploads::{UploadStore, UPLOAD_ROUTE};

pub use error::{ApiError, ErrorBody};
pub use extract::{ApiJson, ApiPath, ApiQuery};

/// Largest accepted request body, sized for attachment uploads.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub uploads: UploadStore,
    /// Public address used in generated agent instructions.
    pub base_url: Arc<str>,
}

impl AppState {
    pub fn new(db: Database, uploads: UploadStore, base_url: impl Into<Arc<str>>) -> Self {
        Self {
            db,
            uploads,
            base_url: base_url.into(),
        }
    }

    /// Runs `f` on the blocking pool with the database.
    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        self.db.call(move |db| Ok(f(db))).await?
    }
}

/// Success envelope of the agent routes.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub ok: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data,
            count: None,
        })
    }
}

impl<T: Serialize> Envelope<Vec<T>> {
    pub fn list(data: Vec<T>) -> Json<Self> {
        Json(Self {
            ok: true,
            count: Some(data.len()),
            data,
        })
    }
}

pub(crate) fn project_exists(db: &Database, project_id: Uuid) -> Result<Project, ApiError> {
    db.get_project(project_id)?
        .ok_or(ApiError::NotFound("project"))
}

/// The feature, provided it belongs to `project_id`.
pub(crate) fn feature_in_project(
    db: &Database,
    project_id: Uuid,
    feature_id: Uuid,
) -> Result<Feature, ApiError> {
    project_exists(db, project_id)?;
    db.get_project_feature(project_id, feature_id)?
        .ok_or(ApiError::NotFound("feature"))
}

pub(crate) fn milestone_in_project(
    db: &Database,
    project_id: Uuid,
    milestone_id: Uuid,
) -> Result<Milestone, ApiError> {
    project_exists(db, project_id)?;
    db.get_project_milestone(project_id, milestone_id)?
        .ok_or(ApiError::NotFound("milestone"))
}

pub fn create_router(state: AppState) -> Router {
    let upload_dir = ServeDir::new(state.uploads.dir());

    let board = Router::new()
        .route("/projects", get(projects::list).post(projects::create))
        .route(
            "/projects/{project_id}",
            get(projects::get).patch(projects::update).delete(projects::delete),
        )
        .route(
            "/projects/{project_id}/features",
            get(features::list).post(features::create),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}",
            get(features::get).patch(features::update).delete(features::delete),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}/position",
            put(features::reposition),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}/export",
            get(features::export),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}/subtasks",
            get(subtasks::list).post(subtasks::create),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}/subtasks/{subtask_id}",
            patch(subtasks::update).delete(subtasks::delete),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}/subtasks/{subtask_id}/position",
            put(subtasks::reposition),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}/attachments",
            post(attachments::upload),
        )
        .route(
            "/projects/{project_id}/features/{feature_id}/attachments/{attachment_id}",
            axum::routing::delete(attachments::delete),
        )
        .route(
            "/projects/{project_id}/milestones",
            get(milestones::list).post(milestones::create),
        )
        .route(
            "/projects/{project_id}/milestones/{milestone_id}",
            patch(milestones::update).delete(milestones::delete),
        )
        .route(
            "/projects/{project_id}/milestones/{milestone_id}/position",
            put(milestones::reposition),
        )
        .route("/projects/{project_id}/changelog", get(changelog::list));

    let agent = Router::new()
        .route("/projects", get(agent::list_projects))
        .route(
            "/projects/{project_id}",
            get(agent::get_project).patch(agent::update_project),
        )
        .route("/projects/{project_id}/context", get(agent::context))
        .route("/projects/{project_id}/changelog", get(agent::changelog))
        .route(
            "/projects/{project_id}/milestones",
            get(agent::list_milestones).post(agent::create_milestone),
        )
        .route(
            "/projects/{project_id}/milestones/{milestone_id}",
            patch(agent::update_milestone).delete(agent::delete_milestone),
        )
        .route(
            "/features",
            get(agent::list_features).post(agent::create_feature),
        )
        .route(
            "/features/{feature_id}",
            get(agent::get_feature).patch(agent::update_feature),
        );

    Router::new()
        .nest("/api", board)
        .nest("/api/agent", agent)
        .nest_service(UPLOAD_ROUTE, upload_dir)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}
