use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FeatureStatus, Priority};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact feature view listed under a milestone on the roadmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneFeature {
    pub id: Uuid,
    pub title: String,
    pub status: FeatureStatus,
    pub priority: Priority,
    pub subtask_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneWithFeatures {
    #[serde(flatten)]
    pub milestone: Milestone,
    pub features: Vec<MilestoneFeature>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateMilestoneInput {
    pub name: String,
    pub description: Option<String>,
    pub target_date: Option<NaiveDate>,
    /// Roadmap index to insert at, clamped to the end. Appended when absent.
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMilestoneInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub target_date: Option<Option<NaiveDate>>,
}
