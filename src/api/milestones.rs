use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::validate::{self, double_option, NAME_MAX};
use super::{milestone_in_project, project_exists, ApiError, ApiJson, ApiPath, AppState};
use crate::models::*;

#[derive(Debug, Deserialize)]
pub struct CreateMilestoneRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "targetDate")]
    pub target_date: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

impl CreateMilestoneRequest {
    pub fn into_input(self) -> Result<CreateMilestoneInput, ApiError> {
        Ok(CreateMilestoneInput {
            name: validate::required_text("name", &self.name, NAME_MAX)?,
            description: validate::empty_to_none(self.description),
            target_date: validate::optional_date("target_date", self.target_date)?,
            position: self
                .position
                .map(|position| {
                    usize::try_from(position)
                        .map_err(|_| ApiError::invalid("position", "position must not be negative"))
                })
                .transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMilestoneRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, alias = "targetDate", deserialize_with = "double_option")]
    pub target_date: Option<Option<String>>,
}

impl UpdateMilestoneRequest {
    pub fn into_input(self) -> Result<UpdateMilestoneInput, ApiError> {
        Ok(UpdateMilestoneInput {
            name: self
                .name
                .map(|name| validate::required_text("name", &name, NAME_MAX))
                .transpose()?,
            description: validate::patch_text(self.description),
            target_date: validate::patch_date("target_date", self.target_date)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    pub position: usize,
}

pub(crate) async fn load_all(
    state: &AppState,
    project_id: Uuid,
) -> Result<Vec<MilestoneWithFeatures>, ApiError> {
    state
        .run(move |db| {
            project_exists(db, project_id)?;
            Ok(db.list_milestones_with_features(project_id)?)
        })
        .await
}

pub(crate) async fn create_in(
    state: &AppState,
    project_id: Uuid,
    req: CreateMilestoneRequest,
) -> Result<Milestone, ApiError> {
    let input = req.into_input()?;
    let milestone = state
        .run(move |db| {
            db.create_milestone(project_id, input)?
                .ok_or(ApiError::NotFound("project"))
        })
        .await?;
    tracing::info!(project_id = %project_id, milestone_id = %milestone.id, "created milestone");
    Ok(milestone)
}

pub(crate) async fn update_in(
    state: &AppState,
    project_id: Uuid,
    milestone_id: Uuid,
    req: UpdateMilestoneRequest,
) -> Result<MilestoneWithFeatures, ApiError> {
    let input = req.into_input()?;
    state
        .run(move |db| {
            milestone_in_project(db, project_id, milestone_id)?;
            db.update_milestone(milestone_id, input)?
                .ok_or(ApiError::NotFound("milestone"))
        })
        .await
}

pub(crate) async fn delete_in(
    state: &AppState,
    project_id: Uuid,
    milestone_id: Uuid,
) -> Result<(), ApiError> {
    state
        .run(move |db| {
            milestone_in_project(db, project_id, milestone_id)?;
            if !db.delete_milestone(milestone_id)? {
                return Err(ApiError::NotFound("milestone"));
            }
            Ok(())
        })
        .await
}

pub async fn list(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<Vec<MilestoneWithFeatures>>, ApiError> {
    Ok(Json(load_all(&state, project_id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateMilestoneRequest>,
) -> Result<(StatusCode, Json<Milestone>), ApiError> {
    let milestone = create_in(&state, project_id, req).await?;
    Ok((StatusCode::CREATED, Json(milestone)))
}

pub async fn update(
    State(state): State<AppState>,
    ApiPath((project_id, milestone_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<UpdateMilestoneRequest>,
) -> Result<Json<MilestoneWithFeatures>, ApiError> {
    Ok(Json(update_in(&state, project_id, milestone_id, req).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    ApiPath((project_id, milestone_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    delete_in(&state, project_id, milestone_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Moves a milestone on the roadmap and returns the new order.
pub async fn reposition(
    State(state): State<AppState>,
    ApiPath((project_id, milestone_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<PositionRequest>,
) -> Result<Json<Vec<MilestoneWithFeatures>>, ApiError> {
    let milestones = state
        .run(move |db| {
            milestone_in_project(db, project_id, milestone_id)?;
            if !db.reorder_milestone(milestone_id, req.position)? {
                return Err(ApiError::NotFound("milestone"));
            }
            Ok(db.list_milestones_with_features(project_id)?)
        })
        .await?;
    Ok(Json(milestones))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(position: Option<i64>) -> CreateMilestoneRequest {
        CreateMilestoneRequest {
            name: "v1".into(),
            description: None,
            target_date: None,
            position,
        }
    }

    #[test]
    fn negative_position_is_rejected() {
        match request(Some(-7)).into_input() {
            Err(ApiError::Validation { field, .. }) => assert_eq!(field, Some("position")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn position_becomes_an_index() {
        assert_eq!(request(Some(3)).into_input().unwrap().position, Some(3));
        assert_eq!(request(None).into_input().unwrap().position, None);
    }
}
