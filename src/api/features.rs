use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use pmboard_core::export;
use pmboard_core::Board;

use super::validate::{self, double_option, TITLE_MAX};
use super::{feature_in_project, project_exists, ApiError, ApiJson, ApiPath, ApiQuery, AppState};
use crate::models::*;

/// New feature. Enum fields are parsed by the caller's rules, as for
/// [`UpdateFeatureRequest`].
#[derive(Debug, Deserialize)]
pub struct CreateFeatureRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "branchUrl")]
    pub branch_url: Option<String>,
    #[serde(default, alias = "prUrl")]
    pub pr_url: Option<String>,
    #[serde(default, alias = "milestoneId")]
    pub milestone_id: Option<Uuid>,
}

impl CreateFeatureRequest {
    pub fn into_input(
        self,
        parse_status: fn(&str) -> Option<FeatureStatus>,
        parse_priority: fn(&str) -> Option<Priority>,
    ) -> Result<CreateFeatureInput, ApiError> {
        Ok(CreateFeatureInput {
            title: validate::required_text("title", &self.title, TITLE_MAX)?,
            description: validate::empty_to_none(self.description),
            spec: validate::empty_to_none(self.spec),
            priority: validate::optional_enum("priority", self.priority.as_deref(), parse_priority)?,
            status: validate::optional_enum("status", self.status.as_deref(), parse_status)?,
            branch_url: validate::optional_url("branch_url", self.branch_url)?,
            pr_url: validate::optional_url("pr_url", self.pr_url)?,
            milestone_id: self.milestone_id,
            subtasks: Vec::new(),
        })
    }
}

/// Partial feature update. Enum fields are parsed by the caller's rules:
/// canonical on board routes, relaxed on agent routes.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateFeatureRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub spec: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "branchUrl", deserialize_with = "double_option")]
    pub branch_url: Option<Option<String>>,
    #[serde(default, alias = "prUrl", deserialize_with = "double_option")]
    pub pr_url: Option<Option<String>>,
    #[serde(default, alias = "milestoneId", deserialize_with = "double_option")]
    pub milestone_id: Option<Option<Uuid>>,
}

impl UpdateFeatureRequest {
    pub fn into_input(
        self,
        parse_status: fn(&str) -> Option<FeatureStatus>,
        parse_priority: fn(&str) -> Option<Priority>,
    ) -> Result<UpdateFeatureInput, ApiError> {
        Ok(UpdateFeatureInput {
            title: self
                .title
                .map(|title| validate::required_text("title", &title, TITLE_MAX))
                .transpose()?,
            description: validate::patch_text(self.description),
            spec: validate::patch_text(self.spec),
            priority: validate::optional_enum("priority", self.priority.as_deref(), parse_priority)?,
            status: validate::optional_enum("status", self.status.as_deref(), parse_status)?,
            branch_url: validate::patch_url("branch_url", self.branch_url)?,
            pr_url: validate::patch_url("pr_url", self.pr_url)?,
            milestone_id: self.milestone_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFeaturesQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveFeatureRequest {
    pub status: String,
    pub position: usize,
}

pub async fn list(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListFeaturesQuery>,
) -> Result<Json<Vec<FeatureSummary>>, ApiError> {
    let status = validate::optional_enum("status", query.status.as_deref(), FeatureStatus::from_str)?;
    let features = state
        .run(move |db| {
            project_exists(db, project_id)?;
            Ok(db.list_features(&FeatureFilter {
                project_id: Some(project_id),
                status,
                ..Default::default()
            })?)
        })
        .await?;
    Ok(Json(features))
}

pub async fn create(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateFeatureRequest>,
) -> Result<(StatusCode, Json<Feature>), ApiError> {
    let input = req.into_input(FeatureStatus::from_str, Priority::from_str)?;
    let (feature, _) = state
        .run(move |db| Ok(Board::human(db).create_feature(project_id, input)?))
        .await?;
    Ok((StatusCode::CREATED, Json(feature)))
}

pub async fn get(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<FeatureDetail>, ApiError> {
    let detail = state
        .run(move |db| {
            feature_in_project(db, project_id, feature_id)?;
            db.get_feature_detail(feature_id)?
                .ok_or(ApiError::NotFound("feature"))
        })
        .await?;
    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<UpdateFeatureRequest>,
) -> Result<Json<Feature>, ApiError> {
    let input = req.into_input(FeatureStatus::from_str, Priority::from_str)?;
    let feature = state
        .run(move |db| {
            feature_in_project(db, project_id, feature_id)?;
            Ok(Board::human(db).update_feature(feature_id, input)?)
        })
        .await?;
    Ok(Json(feature))
}

/// Drag-and-drop move to `position` in the `status` column.
pub async fn reposition(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<MoveFeatureRequest>,
) -> Result<Response, ApiError> {
    let status = validate::enum_value("status", &req.status, FeatureStatus::from_str)?;
    let moved = state
        .run(move |db| {
            feature_in_project(db, project_id, feature_id)?;
            Ok(Board::human(db).move_feature(feature_id, status, req.position)?)
        })
        .await?;

    Ok(match moved {
        Some(feature) => Json(feature).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn delete(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let (_, attachments) = state
        .run(move |db| {
            feature_in_project(db, project_id, feature_id)?;
            Ok(Board::human(db).delete_feature(feature_id)?)
        })
        .await?;

    for attachment in attachments {
        state.uploads.remove(&attachment.filename).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Markdown download of a single feature.
pub async fn export(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let (feature, project, subtasks) = state
        .run(move |db| {
            let feature = feature_in_project(db, project_id, feature_id)?;
            let project = project_exists(db, project_id)?;
            let subtasks = db.list_subtasks(feature_id)?;
            Ok((feature, project, subtasks))
        })
        .await?;

    let body = export::render_feature_markdown(&feature, &project.name, &subtasks, chrono::Utc::now());
    let disposition = format!("attachment; filename=\"{}.md\"", export::slugify(&feature.title));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/markdown; charset=utf-8"),
            ),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition)
                    .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?,
            ),
        ],
        body,
    )
        .into_response())
}
