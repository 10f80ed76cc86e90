use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use pmboard_core::{Board, Database};

use super::validate::{self, TITLE_MAX};
use super::{feature_in_project, ApiError, ApiJson, ApiPath, AppState};
use crate::models::*;

#[derive(Debug, Deserialize)]
pub struct CreateSubtaskRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubtaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    pub position: usize,
}

fn subtask_in_feature(
    db: &Database,
    project_id: Uuid,
    feature_id: Uuid,
    subtask_id: Uuid,
) -> Result<Subtask, ApiError> {
    feature_in_project(db, project_id, feature_id)?;
    db.get_subtask(subtask_id)?
        .filter(|subtask| subtask.feature_id == feature_id)
        .ok_or(ApiError::NotFound("subtask"))
}

pub async fn list(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Vec<Subtask>>, ApiError> {
    let subtasks = state
        .run(move |db| {
            feature_in_project(db, project_id, feature_id)?;
            Ok(db.list_subtasks(feature_id)?)
        })
        .await?;
    Ok(Json(subtasks))
}

pub async fn create(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<CreateSubtaskRequest>,
) -> Result<(StatusCode, Json<Subtask>), ApiError> {
    let title = validate::required_text("title", &req.title, TITLE_MAX)?;
    let subtask = state
        .run(move |db| {
            feature_in_project(db, project_id, feature_id)?;
            Ok(Board::human(db).create_subtask(feature_id, title)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

pub async fn update(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id, subtask_id)): ApiPath<(Uuid, Uuid, Uuid)>,
    ApiJson(req): ApiJson<UpdateSubtaskRequest>,
) -> Result<Json<Subtask>, ApiError> {
    let input = UpdateSubtaskInput {
        title: req
            .title
            .map(|title| validate::required_text("title", &title, TITLE_MAX))
            .transpose()?,
        status: validate::optional_enum("status", req.status.as_deref(), SubtaskStatus::from_str)?,
    };
    let subtask = state
        .run(move |db| {
            subtask_in_feature(db, project_id, feature_id, subtask_id)?;
            Ok(Board::human(db).update_subtask(subtask_id, input)?)
        })
        .await?;
    Ok(Json(subtask))
}

pub async fn delete(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id, subtask_id)): ApiPath<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |db| {
            subtask_in_feature(db, project_id, feature_id, subtask_id)?;
            db.delete_subtask(subtask_id)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Moves a subtask within its checklist and returns the new order.
pub async fn reposition(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id, subtask_id)): ApiPath<(Uuid, Uuid, Uuid)>,
    ApiJson(req): ApiJson<PositionRequest>,
) -> Result<Json<Vec<Subtask>>, ApiError> {
    let subtasks = state
        .run(move |db| {
            subtask_in_feature(db, project_id, feature_id, subtask_id)?;
            db.reorder_subtask(subtask_id, req.position)?;
            Ok(db.list_subtasks(feature_id)?)
        })
        .await?;
    Ok(Json(subtasks))
}
