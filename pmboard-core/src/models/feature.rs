use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Attachment, Subtask};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub spec: Option<String>,
    pub priority: Priority,
    pub status: FeatureStatus,
    pub position: i64,
    pub branch_url: Option<String>,
    pub pr_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureStatus {
    #[default]
    Backlog,
    Todo,
    InProgress,
    InReview,
    Done,
    Cancelled,
}

impl FeatureStatus {
    pub const ALL: [FeatureStatus; 6] = [
        Self::Backlog,
        Self::Todo,
        Self::InProgress,
        Self::InReview,
        Self::Done,
        Self::Cancelled,
    ];

    /// Order in which columns are listed in the context snapshot.
    pub const DISPLAY_ORDER: [FeatureStatus; 6] = [
        Self::InProgress,
        Self::InReview,
        Self::Todo,
        Self::Backlog,
        Self::Done,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "BACKLOG",
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::InReview => "IN_REVIEW",
            Self::Done => "DONE",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Backlog => "Backlog",
            Self::Todo => "Todo",
            Self::InProgress => "In Progress",
            Self::InReview => "In Review",
            Self::Done => "Done",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Canonical spelling only.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BACKLOG" => Some(Self::Backlog),
            "TODO" => Some(Self::Todo),
            "IN_PROGRESS" => Some(Self::InProgress),
            "IN_REVIEW" => Some(Self::InReview),
            "DONE" => Some(Self::Done),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Accepts any casing and treats spaces and hyphens as underscores, so
    /// `"in progress"`, `"IN-PROGRESS"` and `"in_progress"` all resolve to
    /// [`FeatureStatus::InProgress`].
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        Self::from_str(&normalized)
    }

    /// Rank used for `ORDER BY` so SQL sorting follows declaration order.
    pub fn rank(&self) -> i64 {
        *self as i64
    }
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "URGENT" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn parse_lenient(s: &str) -> Option<Self> {
        Self::from_str(&s.trim().to_uppercase())
    }

    pub fn rank(&self) -> i64 {
        *self as i64
    }
}

/// A feature together with its subtask progress, as shown on board columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSummary {
    #[serde(flatten)]
    pub feature: Feature,
    pub subtask_count: i64,
    pub subtasks_done: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDetail {
    #[serde(flatten)]
    pub feature: Feature,
    pub project: ProjectRef,
    pub subtasks: Vec<Subtask>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateFeatureInput {
    pub title: String,
    pub description: Option<String>,
    pub spec: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<FeatureStatus>,
    pub branch_url: Option<String>,
    pub pr_url: Option<String>,
    pub milestone_id: Option<Uuid>,
    /// Subtasks created alongside the feature, in order.
    pub subtasks: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateFeatureInput {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub spec: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub status: Option<FeatureStatus>,
    pub branch_url: Option<Option<String>>,
    pub pr_url: Option<Option<String>>,
    pub milestone_id: Option<Option<Uuid>>,
}

impl UpdateFeatureInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.spec.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.branch_url.is_none()
            && self.pr_url.is_none()
            && self.milestone_id.is_none()
    }
}

/// Filters for feature listings. `limit: None` returns every match.
#[derive(Debug, Clone, Default)]
pub struct FeatureFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<FeatureStatus>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring match over title, description and spec.
    pub query: Option<String>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_status_accepts_separator_and_case_variants() {
        for input in ["in_progress", "In Progress", "IN-PROGRESS", " in-progress "] {
            assert_eq!(
                FeatureStatus::parse_lenient(input),
                Some(FeatureStatus::InProgress),
                "{input}"
            );
        }
    }

    #[test]
    fn canonical_status_rejects_variants() {
        assert_eq!(FeatureStatus::from_str("IN_PROGRESS"), Some(FeatureStatus::InProgress));
        assert_eq!(FeatureStatus::from_str("in_progress"), None);
        assert_eq!(FeatureStatus::from_str("In Progress"), None);
    }

    #[test]
    fn lenient_priority_is_case_insensitive() {
        assert_eq!(Priority::parse_lenient("urgent"), Some(Priority::Urgent));
        assert_eq!(Priority::parse_lenient("High"), Some(Priority::High));
        assert_eq!(Priority::parse_lenient("critical"), None);
    }

    #[test]
    fn status_serializes_in_canonical_spelling() {
        let json = serde_json::to_string(&FeatureStatus::InReview).unwrap();
        assert_eq!(json, "\"IN_REVIEW\"");
        assert!(serde_json::from_str::<FeatureStatus>("\"in_review\"").is_err());
    }
}
