//! Routes for coding agents.
//!
//! Every success is wrapped in [`Envelope`]. Enum input is relaxed: status
//! values ignore case and accept spaces or hyphens for underscores, and
//! camelCase field names are accepted next to snake_case.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pmboard_core::context::{ContextSnapshot, RECENT_FETCH_LIMIT};
use pmboard_core::Board;

use super::changelog::{self, ChangelogQuery};
use super::features::{CreateFeatureRequest, UpdateFeatureRequest};
use super::milestones::{self, CreateMilestoneRequest, UpdateMilestoneRequest};
use super::projects::{self, UpdateProjectRequest};
use super::validate;
use super::{project_exists, ApiError, ApiJson, ApiPath, ApiQuery, AppState, Envelope};
use crate::models::*;

pub const DEFAULT_FEATURE_LIMIT: u32 = 50;
pub const MAX_FEATURE_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
}

/// Changelog pages carry their paging fields next to `ok`.
#[derive(Debug, Serialize)]
pub struct ChangelogEnvelope {
    pub ok: bool,
    #[serde(flatten)]
    pub page: ChangeLogPage,
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentFeaturesQuery {
    #[serde(default, alias = "projectId")]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl AgentFeaturesQuery {
    fn into_filter(self) -> Result<FeatureFilter, ApiError> {
        Ok(FeatureFilter {
            project_id: self.project_id,
            status: validate::optional_enum(
                "status",
                self.status.as_deref(),
                FeatureStatus::parse_lenient,
            )?,
            priority: validate::optional_enum(
                "priority",
                self.priority.as_deref(),
                Priority::parse_lenient,
            )?,
            query: validate::empty_to_none(self.q),
            limit: Some(
                self.limit
                    .unwrap_or(DEFAULT_FEATURE_LIMIT)
                    .clamp(1, MAX_FEATURE_LIMIT),
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentCreateFeatureRequest {
    #[serde(alias = "projectId")]
    pub project_id: Uuid,
    #[serde(flatten)]
    pub feature: CreateFeatureRequest,
    /// Titles of subtasks to create with the feature.
    #[serde(default)]
    pub subtasks: Vec<String>,
}

/// One element of the `subtasks` array on a feature update: a bare string
/// adds a subtask, an object sets the status of an existing one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SubtaskItem {
    Title(String),
    Update { id: Uuid, status: String },
}

impl SubtaskItem {
    fn into_change(self) -> Result<SubtaskChange, ApiError> {
        match self {
            Self::Title(title) => Ok(SubtaskChange::Create {
                title: validate::required_text("subtasks", &title, validate::TITLE_MAX)?,
            }),
            Self::Update { id, status } => Ok(SubtaskChange::SetStatus {
                id,
                status: validate::enum_value("subtasks", &status, SubtaskStatus::parse_lenient)?,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentUpdateFeatureRequest {
    #[serde(flatten)]
    pub feature: UpdateFeatureRequest,
    #[serde(default)]
    pub subtasks: Vec<SubtaskItem>,
}

pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<ProjectSummary>>>, ApiError> {
    let projects = state.run(|db| Ok(db.list_projects()?)).await?;
    Ok(Envelope::list(projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<Envelope<ProjectSummary>>, ApiError> {
    Ok(Envelope::data(projects::load(&state, project_id).await?))
}

pub async fn update_project(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateProjectRequest>,
) -> Result<Json<Envelope<Project>>, ApiError> {
    Ok(Envelope::data(projects::apply_update(&state, project_id, req).await?))
}

/// The project snapshot as markdown (default) or JSON. The four reads run
/// concurrently.
pub async fn context(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ContextQuery>,
) -> Result<Response, ApiError> {
    let db = &state.db;
    let (project, features, milestones, recent) = tokio::try_join!(
        db.call(move |db| db.get_project(project_id)),
        db.call(move |db| db.list_project_features_with_subtasks(project_id)),
        db.call(move |db| db.list_milestones(project_id)),
        db.call(move |db| db.recent_changes(project_id, RECENT_FETCH_LIMIT)),
    )?;
    let project = project.ok_or(ApiError::NotFound("project"))?;
    let snapshot = ContextSnapshot::assemble(project, features, milestones, recent);

    if query.format.as_deref() == Some("json") {
        return Ok(Envelope::data(snapshot).into_response());
    }

    let body = snapshot.render_markdown(&state.base_url, chrono::Utc::now());
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        body,
    )
        .into_response())
}

pub async fn changelog(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ChangelogQuery>,
) -> Result<Json<ChangelogEnvelope>, ApiError> {
    let page = changelog::load_page(&state, project_id, query).await?;
    Ok(Json(ChangelogEnvelope { ok: true, page }))
}

pub async fn list_milestones(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<Envelope<Vec<MilestoneWithFeatures>>>, ApiError> {
    Ok(Envelope::list(milestones::load_all(&state, project_id).await?))
}

pub async fn create_milestone(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateMilestoneRequest>,
) -> Result<(StatusCode, Json<Envelope<Milestone>>), ApiError> {
    let milestone = milestones::create_in(&state, project_id, req).await?;
    Ok((StatusCode::CREATED, Envelope::data(milestone)))
}

pub async fn update_milestone(
    State(state): State<AppState>,
    ApiPath((project_id, milestone_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<UpdateMilestoneRequest>,
) -> Result<Json<Envelope<MilestoneWithFeatures>>, ApiError> {
    Ok(Envelope::data(
        milestones::update_in(&state, project_id, milestone_id, req).await?,
    ))
}

pub async fn delete_milestone(
    State(state): State<AppState>,
    ApiPath((project_id, milestone_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Envelope<Deleted>>, ApiError> {
    milestones::delete_in(&state, project_id, milestone_id).await?;
    Ok(Envelope::data(Deleted { id: milestone_id }))
}

pub async fn list_features(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AgentFeaturesQuery>,
) -> Result<Json<Envelope<Vec<FeatureSummary>>>, ApiError> {
    let filter = query.into_filter()?;
    let features = state
        .run(move |db| {
            if let Some(project_id) = filter.project_id {
                project_exists(db, project_id)?;
            }
            Ok(db.list_features(&filter)?)
        })
        .await?;
    Ok(Envelope::list(features))
}

pub async fn create_feature(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AgentCreateFeatureRequest>,
) -> Result<(StatusCode, Json<Envelope<FeatureDetail>>), ApiError> {
    let project_id = req.project_id;
    let mut input = req
        .feature
        .into_input(FeatureStatus::parse_lenient, Priority::parse_lenient)?;
    input.subtasks = req
        .subtasks
        .iter()
        .map(|title| validate::required_text("subtasks", title, validate::TITLE_MAX))
        .collect::<Result<_, _>>()?;

    let detail = state
        .run(move |db| {
            let (feature, _) = Board::agent(db).create_feature(project_id, input)?;
            db.get_feature_detail(feature.id)?
                .ok_or(ApiError::NotFound("feature"))
        })
        .await?;
    Ok((StatusCode::CREATED, Envelope::data(detail)))
}

pub async fn get_feature(
    State(state): State<AppState>,
    ApiPath(feature_id): ApiPath<Uuid>,
) -> Result<Json<Envelope<FeatureDetail>>, ApiError> {
    let detail = state
        .run(move |db| {
            db.get_feature_detail(feature_id)?
                .ok_or(ApiError::NotFound("feature"))
        })
        .await?;
    Ok(Envelope::data(detail))
}

/// Field update plus an optional subtask batch. The batch is applied first
/// and atomically.
pub async fn update_feature(
    State(state): State<AppState>,
    ApiPath(feature_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AgentUpdateFeatureRequest>,
) -> Result<Json<Envelope<FeatureDetail>>, ApiError> {
    let input = req
        .feature
        .into_input(FeatureStatus::parse_lenient, Priority::parse_lenient)?;
    let changes = req
        .subtasks
        .into_iter()
        .map(SubtaskItem::into_change)
        .collect::<Result<Vec<_>, _>>()?;

    let detail = state
        .run(move |db| Ok(Board::agent(db).apply_agent_update(feature_id, changes, input)?))
        .await?;
    Ok(Envelope::data(detail))
}
