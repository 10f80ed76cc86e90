use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;

use pmboard_core::db::DEFAULT_PAGE_SIZE;

use super::{project_exists, ApiError, ApiPath, ApiQuery, AppState};
use crate::models::ChangeLogPage;

#[derive(Debug, Deserialize)]
pub struct ChangelogQuery {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_page_size", alias = "pageSize", alias = "limit")]
    pub page_size: u32,
    #[serde(default)]
    pub dedupe: bool,
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

pub(crate) async fn load_page(
    state: &AppState,
    project_id: Uuid,
    query: ChangelogQuery,
) -> Result<ChangeLogPage, ApiError> {
    state
        .run(move |db| {
            project_exists(db, project_id)?;
            Ok(db.changelog_page(project_id, query.page, query.page_size, query.dedupe)?)
        })
        .await
}

pub async fn list(
    State(state): State<AppState>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ChangelogQuery>,
) -> Result<Json<ChangeLogPage>, ApiError> {
    Ok(Json(load_page(&state, project_id, query).await?))
}
