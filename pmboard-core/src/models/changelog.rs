use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    pub id: Uuid,
    pub project_id: Uuid,
    pub action: ChangeAction,
    pub summary: String,
    pub feature_id: Option<Uuid>,
    /// Title at the time of the change; survives renames and deletion.
    pub feature_title: Option<String>,
    pub subtask_id: Option<Uuid>,
    pub subtask_title: Option<String>,
    pub meta: Option<Value>,
    pub source: ChangeSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    FeatureCreated,
    FeatureDeleted,
    FeatureUpdated,
    StatusChanged,
    PriorityChanged,
    SpecUpdated,
    SubtaskDone,
    SubtaskReopened,
    SubtaskCreated,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeatureCreated => "FEATURE_CREATED",
            Self::FeatureDeleted => "FEATURE_DELETED",
            Self::FeatureUpdated => "FEATURE_UPDATED",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::PriorityChanged => "PRIORITY_CHANGED",
            Self::SpecUpdated => "SPEC_UPDATED",
            Self::SubtaskDone => "SUBTASK_DONE",
            Self::SubtaskReopened => "SUBTASK_REOPENED",
            Self::SubtaskCreated => "SUBTASK_CREATED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FEATURE_CREATED" => Some(Self::FeatureCreated),
            "FEATURE_DELETED" => Some(Self::FeatureDeleted),
            "FEATURE_UPDATED" => Some(Self::FeatureUpdated),
            "STATUS_CHANGED" => Some(Self::StatusChanged),
            "PRIORITY_CHANGED" => Some(Self::PriorityChanged),
            "SPEC_UPDATED" => Some(Self::SpecUpdated),
            "SUBTASK_DONE" => Some(Self::SubtaskDone),
            "SUBTASK_REOPENED" => Some(Self::SubtaskReopened),
            "SUBTASK_CREATED" => Some(Self::SubtaskCreated),
            _ => None,
        }
    }
}

/// Who performed a change: a person through the board, or an agent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    #[default]
    Human,
    Agent,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Self::Human),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChangeLogEntry {
    pub project_id: Uuid,
    pub action: ChangeAction,
    pub summary: String,
    pub feature_id: Option<Uuid>,
    pub feature_title: Option<String>,
    pub subtask_id: Option<Uuid>,
    pub subtask_title: Option<String>,
    pub meta: Option<Value>,
    pub source: ChangeSource,
}

impl NewChangeLogEntry {
    pub fn new(project_id: Uuid, action: ChangeAction, summary: impl Into<String>) -> Self {
        Self {
            project_id,
            action,
            summary: summary.into(),
            feature_id: None,
            feature_title: None,
            subtask_id: None,
            subtask_title: None,
            meta: None,
            source: ChangeSource::Human,
        }
    }

    pub fn feature(mut self, id: Uuid, title: &str) -> Self {
        self.feature_id = Some(id);
        self.feature_title = Some(title.to_string());
        self
    }

    pub fn subtask(mut self, id: Uuid, title: &str) -> Self {
        self.subtask_id = Some(id);
        self.subtask_title = Some(title.to_string());
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn source(mut self, source: ChangeSource) -> Self {
        self.source = source;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogPage {
    pub data: Vec<ChangeLogEntry>,
    pub count: usize,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: u32,
    pub deduped: bool,
}
