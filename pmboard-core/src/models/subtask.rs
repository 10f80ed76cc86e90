use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub id: Uuid,
    pub feature_id: Uuid,
    pub title: String,
    pub status: SubtaskStatus,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtaskStatus {
    #[default]
    Open,
    Done,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Done => "DONE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "DONE" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn parse_lenient(s: &str) -> Option<Self> {
        Self::from_str(&s.trim().to_uppercase())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSubtaskInput {
    pub title: Option<String>,
    pub status: Option<SubtaskStatus>,
}

/// One element of a batched subtask edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtaskChange {
    Create { title: String },
    SetStatus { id: Uuid, status: SubtaskStatus },
}
