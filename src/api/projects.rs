use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::validate::{self, double_option, NAME_MAX};
use super::{project_exists, ApiError, ApiJson, ApiPath, AppState};
use crate::models::*;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "repoUrl")]
    pub repo_url: Option<String>,
    #[serde(default, alias = "contextMd")]
    pub context_md: Option<String>,
}

impl CreateProjectRequest {
    pub fn into_input(self) -> Result<CreateProjectInput, ApiError> {
        Ok(CreateProjectInput {
            name: validate::required_text("name", &self.name, NAME_MAX)?,
            description: validate::empty_to_none(self.description),
            repo_url: validate::optional_url("repo_url", self.repo_url)?,
            context_md: validate::empty_to_none(self.context_md),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, alias = "repoUrl", deserialize_with = "double_option")]
    pub repo_url: Option<Option<String>>,
    #[serde(default, alias = "contextMd", deserialize_with = "double_option")]
    pub context_md: Option<Option<String>>,
}

impl UpdateProjectRequest {
    pub fn into_input(self) -> Result<UpdateProjectInput, ApiError> {
        Ok(UpdateProjectInput {
            name: self
                .name
                .map(|name| validate::required_text("name", &name, NAME_MAX))
                .transpose()?,
            description: validate::patch_text(self.description),
            repo_url: validate::patch_url("repo_url", self.repo_url)?,
            context_md: validate::patch_text(self.context_md),
        })
    }
}

pub(crate) async fn load(state: &AppState, id: Uuid) -> Result<ProjectSummary, ApiError> {
    state
        .run(move |db| {
            db.get_project_summary(id)?
                .ok_or(ApiError::NotFound("project"))
        })
        .await
}

pub(crate) async fn apply_update(
    state: &AppState,
    id: Uuid,
    req: UpdateProjectRequest,
) -> Result<Project, ApiError> {
    let input = req.into_input()?;
    let project = state
        .run(move |db| {
            db.update_project(id, input)?
                .ok_or(ApiError::NotFound("project"))
        })
        .await?;
    tracing::info!(project_id = %id, "updated project");
    Ok(project)
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ProjectSummary>>, ApiError> {
    let projects = state.run(|db| Ok(db.list_projects()?)).await?;
    Ok(Json(projects))
}

pub async fn create(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let input = req.into_input()?;
    let project = state.run(move |db| Ok(db.create_project(input)?)).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ProjectSummary>, ApiError> {
    Ok(Json(load(&state, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(apply_update(&state, id, req).await?))
}

/// Deletes the project with everything it owns, including stored
/// attachment files.
pub async fn delete(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let attachments = state
        .run(move |db| {
            project_exists(db, id)?;
            let attachments = db.list_project_attachments(id)?;
            db.delete_project(id)?;
            Ok(attachments)
        })
        .await?;

    for attachment in attachments {
        state.uploads.remove(&attachment.filename).await;
    }
    Ok(StatusCode::NO_CONTENT)
}
