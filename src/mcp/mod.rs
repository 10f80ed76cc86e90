use std::sync::Arc;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router,
    schemars::JsonSchema,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pmboard_core::context::ContextSnapshot;
use pmboard_core::Board;

use crate::api::{project_exists, validate, ApiError};
use crate::db::Database;
use crate::models::*;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct McpServer {
    db: Database,
    base_url: Arc<str>,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetProjectContextRequest {
    #[schemars(description = "The project ID")]
    pub project_id: String,
    #[schemars(description = "Either \"markdown\" (default) or \"json\"")]
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListFeaturesRequest {
    #[schemars(description = "Only features of this project")]
    #[serde(default)]
    pub project_id: Option<String>,
    #[schemars(description = "Status filter, e.g. \"in progress\" or \"TODO\"")]
    #[serde(default)]
    pub status: Option<String>,
    #[schemars(description = "Priority filter: LOW, MEDIUM, HIGH or URGENT")]
    #[serde(default)]
    pub priority: Option<String>,
    #[schemars(description = "Text searched in title, description and spec")]
    #[serde(default)]
    pub query: Option<String>,
    #[schemars(description = "Maximum number of results (1-100, default 50)")]
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetFeatureRequest {
    #[schemars(description = "The feature ID")]
    pub feature_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFeatureRequest {
    #[schemars(description = "The project to add the feature to")]
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[schemars(description = "Implementation spec in markdown")]
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[schemars(description = "Initial status column, BACKLOG when omitted")]
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub branch_url: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub milestone_id: Option<String>,
    #[schemars(description = "Titles of subtasks to create with the feature")]
    #[serde(default)]
    pub subtasks: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubtaskStatusUpdate {
    pub subtask_id: String,
    #[schemars(description = "OPEN or DONE")]
    pub status: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateFeatureRequest {
    #[schemars(description = "The feature ID")]
    pub feature_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub branch_url: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[schemars(description = "Milestone to schedule the feature in, empty to unschedule")]
    #[serde(default)]
    pub milestone_id: Option<String>,
    #[schemars(description = "Subtask titles to append")]
    #[serde(default)]
    pub add_subtasks: Vec<String>,
    #[schemars(description = "Status changes for existing subtasks, applied before the field update")]
    #[serde(default)]
    pub subtask_updates: Vec<SubtaskStatusUpdate>,
}

#[derive(Debug, Serialize)]
struct FeatureList {
    count: usize,
    features: Vec<FeatureSummary>,
}

fn internal(err: anyhow::Error) -> McpError {
    McpError::internal_error(format!("{:#}", err), None)
}

fn tool_error(err: ApiError) -> McpError {
    match err {
        ApiError::Internal(err) => {
            tracing::error!(error = ?err, "tool call failed");
            internal(err)
        }
        other => McpError::invalid_params(other.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

impl McpServer {
    pub fn new(db: Database, base_url: impl Into<Arc<str>>) -> Self {
        Self {
            db,
            base_url: base_url.into(),
            tool_router: Self::tool_router(),
        }
    }

    fn parse_uuid(field: &str, s: &str) -> Result<Uuid, McpError> {
        Uuid::parse_str(s.trim())
            .map_err(|e| McpError::invalid_params(format!("Invalid {}: {}", field, e), None))
    }

    async fn run<T, F>(&self, f: F) -> Result<T, McpError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        self.db
            .call(move |db| Ok(f(db)))
            .await
            .map_err(internal)?
            .map_err(tool_error)
    }
}

#[tool_router]
impl McpServer {
    #[tool(description = "Get the project context: mission, features by status, milestones, recent activity and the expected agent workflow")]
    async fn get_project_context(
        &self,
        params: Parameters<GetProjectContextRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let project_id = Self::parse_uuid("project_id", &req.project_id)?;

        let snapshot = self
            .run(move |db| ContextSnapshot::load(db, project_id)?.ok_or(ApiError::NotFound("project")))
            .await?;

        if req.format.as_deref() == Some("json") {
            return json_result(&snapshot);
        }
        let markdown = snapshot.render_markdown(&self.base_url, chrono::Utc::now());
        Ok(CallToolResult::success(vec![Content::text(markdown)]))
    }

    #[tool(description = "List features, optionally filtered by project, status, priority or text")]
    async fn list_features(
        &self,
        params: Parameters<ListFeaturesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let filter = FeatureFilter {
            project_id: req
                .project_id
                .as_deref()
                .map(|id| Self::parse_uuid("project_id", id))
                .transpose()?,
            status: validate::optional_enum("status", req.status.as_deref(), FeatureStatus::parse_lenient)
                .map_err(tool_error)?,
            priority: validate::optional_enum("priority", req.priority.as_deref(), Priority::parse_lenient)
                .map_err(tool_error)?,
            query: validate::empty_to_none(req.query),
            limit: Some(req.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)),
        };

        let features = self
            .run(move |db| {
                if let Some(project_id) = filter.project_id {
                    project_exists(db, project_id)?;
                }
                Ok(db.list_features(&filter)?)
            })
            .await?;
        json_result(&FeatureList {
            count: features.len(),
            features,
        })
    }

    #[tool(description = "Get a feature with its subtasks and attachments")]
    async fn get_feature(
        &self,
        params: Parameters<GetFeatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let feature_id = Self::parse_uuid("feature_id", &params.0.feature_id)?;
        let detail = self
            .run(move |db| db.get_feature_detail(feature_id)?.ok_or(ApiError::NotFound("feature")))
            .await?;
        json_result(&detail)
    }

    #[tool(description = "Create a feature, optionally with initial subtasks")]
    async fn create_feature(
        &self,
        params: Parameters<CreateFeatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let project_id = Self::parse_uuid("project_id", &req.project_id)?;
        let milestone_id = req
            .milestone_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(|id| Self::parse_uuid("milestone_id", id))
            .transpose()?;
        let input = create_input(req, milestone_id).map_err(tool_error)?;

        let detail = self
            .run(move |db| {
                let (feature, _) = Board::agent(db).create_feature(project_id, input)?;
                db.get_feature_detail(feature.id)?
                    .ok_or(ApiError::NotFound("feature"))
            })
            .await?;
        json_result(&detail)
    }

    #[tool(description = "Update a feature's fields and subtasks. Move it to IN_PROGRESS when starting and IN_REVIEW when done")]
    async fn update_feature(
        &self,
        params: Parameters<UpdateFeatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let feature_id = Self::parse_uuid("feature_id", &req.feature_id)?;

        let mut changes = Vec::new();
        for update in &req.subtask_updates {
            changes.push(SubtaskChange::SetStatus {
                id: Self::parse_uuid("subtask_id", &update.subtask_id)?,
                status: validate::enum_value("status", &update.status, SubtaskStatus::parse_lenient)
                    .map_err(tool_error)?,
            });
        }
        for title in &req.add_subtasks {
            changes.push(SubtaskChange::Create {
                title: validate::required_text("add_subtasks", title, validate::TITLE_MAX)
                    .map_err(tool_error)?,
            });
        }
        let input = update_input(req).map_err(tool_error)?;

        let detail = self
            .run(move |db| Ok(Board::agent(db).apply_agent_update(feature_id, changes, input)?))
            .await?;
        json_result(&detail)
    }
}

fn create_input(
    req: CreateFeatureRequest,
    milestone_id: Option<Uuid>,
) -> Result<CreateFeatureInput, ApiError> {
    Ok(CreateFeatureInput {
        title: validate::required_text("title", &req.title, validate::TITLE_MAX)?,
        description: validate::empty_to_none(req.description),
        spec: validate::empty_to_none(req.spec),
        priority: validate::optional_enum("priority", req.priority.as_deref(), Priority::parse_lenient)?,
        status: validate::optional_enum("status", req.status.as_deref(), FeatureStatus::parse_lenient)?,
        branch_url: validate::optional_url("branch_url", req.branch_url)?,
        pr_url: validate::optional_url("pr_url", req.pr_url)?,
        milestone_id,
        subtasks: req
            .subtasks
            .iter()
            .map(|title| validate::required_text("subtasks", title, validate::TITLE_MAX))
            .collect::<Result<_, _>>()?,
    })
}

/// Tool arguments cannot express "clear this field", so an empty string
/// clears and an absent one leaves the field alone.
fn update_input(req: UpdateFeatureRequest) -> Result<UpdateFeatureInput, ApiError> {
    Ok(UpdateFeatureInput {
        title: req
            .title
            .map(|title| validate::required_text("title", &title, validate::TITLE_MAX))
            .transpose()?,
        description: validate::patch_text(req.description.map(Some)),
        spec: validate::patch_text(req.spec.map(Some)),
        priority: validate::optional_enum("priority", req.priority.as_deref(), Priority::parse_lenient)?,
        status: validate::optional_enum("status", req.status.as_deref(), FeatureStatus::parse_lenient)?,
        branch_url: validate::patch_url("branch_url", req.branch_url.map(Some))?,
        pr_url: validate::patch_url("pr_url", req.pr_url.map(Some))?,
        milestone_id: req
            .milestone_id
            .map(|id| match id.trim() {
                "" => Ok(None),
                id => Uuid::parse_str(id)
                    .map(Some)
                    .map_err(|_| ApiError::invalid("milestone_id", "milestone_id must be a UUID")),
            })
            .transpose()?,
    })
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "PM Board MCP server. Read the project context first, move a feature to IN_PROGRESS before working on it, tick subtasks as you finish them and move it to IN_REVIEW with a branch or PR URL when done.".into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(db: Database, base_url: String) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(db, base_url);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
