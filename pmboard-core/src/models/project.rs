use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    /// Long-form mission/context markdown shown to agents.
    pub context_md: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub feature_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CreateProjectInput {
    pub name: String,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    pub context_md: Option<String>,
}

/// Partial update. The outer `Option` marks presence, the inner one allows
/// clearing a nullable column.
#[derive(Debug, Clone, Default)]
pub struct UpdateProjectInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub repo_url: Option<Option<String>>,
    pub context_md: Option<Option<String>>,
}
