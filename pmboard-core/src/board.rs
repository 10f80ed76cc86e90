//! Board mutations that record their effects in the changelog.
//!
//! [`Board`] wraps a [`Database`] with the [`ChangeSource`] of the caller.
//! Each method commits the primary change first and then appends one
//! changelog entry per meaningfully changed field. Appending is best effort:
//! a failed append is logged and the mutation still succeeds.

use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{AppliedSubtaskChange, BatchError, Database, MoveOutcome};
use crate::models::*;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BoardError>;

pub struct Board<'a> {
    db: &'a Database,
    source: ChangeSource,
}

impl<'a> Board<'a> {
    pub fn new(db: &'a Database, source: ChangeSource) -> Self {
        Self { db, source }
    }

    pub fn human(db: &'a Database) -> Self {
        Self::new(db, ChangeSource::Human)
    }

    pub fn agent(db: &'a Database) -> Self {
        Self::new(db, ChangeSource::Agent)
    }

    fn record(&self, entry: NewChangeLogEntry) {
        let action = entry.action;
        if let Err(err) = self.db.append_change(entry.source(self.source)) {
            tracing::warn!(action = action.as_str(), error = %err, "failed to record change");
        }
    }

    fn check_milestone(&self, project_id: Uuid, milestone_id: Option<Uuid>) -> Result<()> {
        let Some(milestone_id) = milestone_id else {
            return Ok(());
        };
        if self
            .db
            .get_project_milestone(project_id, milestone_id)?
            .is_none()
        {
            return Err(BoardError::Invalid {
                field: "milestone_id",
                message: "milestone does not belong to this project".into(),
            });
        }
        Ok(())
    }

    /// Creates a feature at the end of its column, together with any
    /// initial subtasks.
    pub fn create_feature(
        &self,
        project_id: Uuid,
        input: CreateFeatureInput,
    ) -> Result<(Feature, Vec<Subtask>)> {
        if self.db.get_project(project_id)?.is_none() {
            return Err(BoardError::NotFound("project"));
        }
        self.check_milestone(project_id, input.milestone_id)?;

        let (feature, subtasks) = self
            .db
            .create_feature(project_id, input)?
            .ok_or(BoardError::NotFound("project"))?;
        tracing::info!(
            feature_id = %feature.id,
            project_id = %project_id,
            source = self.source.as_str(),
            "created feature"
        );

        self.record(
            NewChangeLogEntry::new(
                project_id,
                ChangeAction::FeatureCreated,
                format!("Feature created: \"{}\"", feature.title),
            )
            .feature(feature.id, &feature.title)
            .meta(json!({
                "status": feature.status.as_str(),
                "priority": feature.priority.as_str(),
            })),
        );
        for subtask in &subtasks {
            self.record(subtask_created(&feature, subtask));
        }
        Ok((feature, subtasks))
    }

    pub fn update_feature(&self, id: Uuid, input: UpdateFeatureInput) -> Result<Feature> {
        let current = self
            .db
            .get_feature(id)?
            .ok_or(BoardError::NotFound("feature"))?;
        if let Some(milestone_id) = input.milestone_id {
            self.check_milestone(current.project_id, milestone_id)?;
        }

        let (before, after) = self
            .db
            .update_feature(id, input)?
            .ok_or(BoardError::NotFound("feature"))?;
        self.record_feature_diff(&before, &after);
        Ok(after)
    }

    /// Drag-and-drop move. Returns `None` when the feature was deleted
    /// before the move committed; nothing is changed in that case.
    pub fn move_feature(
        &self,
        id: Uuid,
        status: FeatureStatus,
        index: usize,
    ) -> Result<Option<Feature>> {
        match self.db.move_feature(id, status, index)? {
            MoveOutcome::Missing => Ok(None),
            MoveOutcome::Moved { before, after } => {
                if before.status != after.status {
                    self.record(status_changed(&before, &after));
                }
                Ok(Some(after))
            }
        }
    }

    /// Deletes a feature and returns it with its attachments so the caller
    /// can remove stored files.
    pub fn delete_feature(&self, id: Uuid) -> Result<(Feature, Vec<Attachment>)> {
        let (feature, attachments) = self
            .db
            .delete_feature(id)?
            .ok_or(BoardError::NotFound("feature"))?;
        tracing::info!(feature_id = %id, source = self.source.as_str(), "deleted feature");

        self.record(
            NewChangeLogEntry::new(
                feature.project_id,
                ChangeAction::FeatureDeleted,
                format!("Feature deleted: \"{}\"", feature.title),
            )
            .feature(feature.id, &feature.title)
            .meta(json!({ "status": feature.status.as_str() })),
        );
        Ok((feature, attachments))
    }

    pub fn create_subtask(&self, feature_id: Uuid, title: String) -> Result<Subtask> {
        let feature = self
            .db
            .get_feature(feature_id)?
            .ok_or(BoardError::NotFound("feature"))?;
        let subtask = self
            .db
            .create_subtask(feature_id, title)?
            .ok_or(BoardError::NotFound("feature"))?;
        self.record(subtask_created(&feature, &subtask));
        Ok(subtask)
    }

    pub fn update_subtask(&self, id: Uuid, input: UpdateSubtaskInput) -> Result<Subtask> {
        let (before, after) = self
            .db
            .update_subtask(id, input)?
            .ok_or(BoardError::NotFound("subtask"))?;
        if before.status != after.status {
            if let Some(feature) = self.db.get_feature(after.feature_id)? {
                self.record(subtask_status_changed(&feature, &before, &after));
            }
        }
        Ok(after)
    }

    /// Agent-side feature edit: applies the subtask batch in one
    /// transaction, then the field update.
    ///
    /// An unknown subtask id rejects the whole request before anything is
    /// written.
    pub fn apply_agent_update(
        &self,
        feature_id: Uuid,
        changes: Vec<SubtaskChange>,
        input: UpdateFeatureInput,
    ) -> Result<FeatureDetail> {
        let feature = self
            .db
            .get_feature(feature_id)?
            .ok_or(BoardError::NotFound("feature"))?;
        if let Some(milestone_id) = input.milestone_id {
            self.check_milestone(feature.project_id, milestone_id)?;
        }

        if !changes.is_empty() {
            let applied = self
                .db
                .apply_subtask_changes(feature_id, changes)?
                .map_err(|err| match err {
                    BatchError::UnknownSubtask(id) => {
                        tracing::debug!(subtask_id = %id, "subtask batch rejected");
                        BoardError::NotFound("subtask")
                    }
                })?;
            for change in &applied {
                match change {
                    AppliedSubtaskChange::Created(subtask) => {
                        self.record(subtask_created(&feature, subtask));
                    }
                    AppliedSubtaskChange::StatusChanged { before, after } => {
                        self.record(subtask_status_changed(&feature, before, after));
                    }
                    AppliedSubtaskChange::Unchanged(_) => {}
                }
            }
        }

        if !input.is_empty() {
            self.update_feature(feature_id, input)?;
        }

        self.db
            .get_feature_detail(feature_id)?
            .ok_or(BoardError::NotFound("feature"))
    }

    fn record_feature_diff(&self, before: &Feature, after: &Feature) {
        let entry = |action: ChangeAction, summary: String| {
            NewChangeLogEntry::new(after.project_id, action, summary).feature(after.id, &after.title)
        };

        if before.status != after.status {
            self.record(status_changed(before, after));
        }
        if before.priority != after.priority {
            self.record(
                entry(
                    ChangeAction::PriorityChanged,
                    format!(
                        "Priority changed from {} to {}",
                        before.priority.as_str(),
                        after.priority.as_str()
                    ),
                )
                .meta(json!({ "from": before.priority.as_str(), "to": after.priority.as_str() })),
            );
        }
        if before.spec != after.spec {
            self.record(
                entry(ChangeAction::SpecUpdated, "Spec updated".into())
                    .meta(json!({ "from": before.spec, "to": after.spec })),
            );
        }

        let text_fields = [
            ("title", "Title", Some(before.title.as_str()), Some(after.title.as_str())),
            (
                "description",
                "Description",
                before.description.as_deref(),
                after.description.as_deref(),
            ),
            (
                "branch_url",
                "Branch URL",
                before.branch_url.as_deref(),
                after.branch_url.as_deref(),
            ),
            ("pr_url", "PR URL", before.pr_url.as_deref(), after.pr_url.as_deref()),
        ];
        for (field, label, from, to) in text_fields {
            if from != to {
                self.record(
                    entry(ChangeAction::FeatureUpdated, format!("{} updated", label))
                        .meta(json!({ "field": field, "from": from, "to": to })),
                );
            }
        }

        if before.milestone_id != after.milestone_id {
            self.record(
                entry(ChangeAction::FeatureUpdated, "Milestone changed".into()).meta(json!({
                    "field": "milestone_id",
                    "from": before.milestone_id.map(|id| id.to_string()),
                    "to": after.milestone_id.map(|id| id.to_string()),
                })),
            );
        }
    }
}

fn status_changed(before: &Feature, after: &Feature) -> NewChangeLogEntry {
    NewChangeLogEntry::new(
        after.project_id,
        ChangeAction::StatusChanged,
        format!(
            "Status changed from {} to {}",
            before.status.label(),
            after.status.label()
        ),
    )
    .feature(after.id, &after.title)
    .meta(json!({ "from": before.status.as_str(), "to": after.status.as_str() }))
}

fn subtask_created(feature: &Feature, subtask: &Subtask) -> NewChangeLogEntry {
    NewChangeLogEntry::new(
        feature.project_id,
        ChangeAction::SubtaskCreated,
        format!("Subtask added: \"{}\"", subtask.title),
    )
    .feature(feature.id, &feature.title)
    .subtask(subtask.id, &subtask.title)
}

fn subtask_status_changed(feature: &Feature, before: &Subtask, after: &Subtask) -> NewChangeLogEntry {
    let (action, verb) = if after.status.is_done() {
        (ChangeAction::SubtaskDone, "completed")
    } else {
        (ChangeAction::SubtaskReopened, "reopened")
    };
    NewChangeLogEntry::new(
        feature.project_id,
        action,
        format!("Subtask {}: \"{}\"", verb, after.title),
    )
    .feature(feature.id, &feature.title)
    .subtask(after.id, &after.title)
    .meta(json!({ "from": before.status.as_str(), "to": after.status.as_str() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, Uuid) {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        let project = db
            .create_project(CreateProjectInput {
                name: "p".into(),
                ..Default::default()
            })
            .unwrap();
        (db, project.id)
    }

    fn actions(db: &Database, project: Uuid) -> Vec<ChangeAction> {
        let mut entries = db.recent_changes(project, 100).unwrap();
        entries.reverse();
        entries.into_iter().map(|e| e.action).collect()
    }

    #[test]
    fn create_records_feature_and_initial_subtasks() {
        let (db, project) = setup();
        let (feature, subtasks) = Board::human(&db)
            .create_feature(project, CreateFeatureInput {
                title: "Login".into(),
                subtasks: vec!["form".into(), "session".into()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(subtasks.len(), 2);
        assert_eq!(
            actions(&db, project),
            vec![
                ChangeAction::FeatureCreated,
                ChangeAction::SubtaskCreated,
                ChangeAction::SubtaskCreated
            ]
        );
        let created = db.recent_changes(project, 100).unwrap().pop().unwrap();
        assert_eq!(created.summary, "Feature created: \"Login\"");
        assert_eq!(created.feature_id, Some(feature.id));
        assert_eq!(
            created.meta,
            Some(json!({ "status": "BACKLOG", "priority": "MEDIUM" }))
        );
    }

    #[test]
    fn create_in_missing_project_is_not_found() {
        let (db, _) = setup();
        let err = Board::human(&db)
            .create_feature(Uuid::new_v4(), CreateFeatureInput {
                title: "x".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, BoardError::NotFound("project")));
    }

    #[test]
    fn update_records_one_entry_per_changed_field() {
        let (db, project) = setup();
        let board = Board::agent(&db);
        let (feature, _) = board
            .create_feature(project, CreateFeatureInput {
                title: "Login".into(),
                ..Default::default()
            })
            .unwrap();

        board
            .update_feature(feature.id, UpdateFeatureInput {
                status: Some(FeatureStatus::InProgress),
                priority: Some(Priority::High),
                spec: Some(Some("## Plan".into())),
                branch_url: Some(Some("https://example.com/tree/login".into())),
                ..Default::default()
            })
            .unwrap();

        let entries = db.recent_changes(project, 100).unwrap();
        let status = entries
            .iter()
            .find(|e| e.action == ChangeAction::StatusChanged)
            .unwrap();
        assert_eq!(status.meta, Some(json!({ "from": "BACKLOG", "to": "IN_PROGRESS" })));
        assert_eq!(status.source, ChangeSource::Agent);
        assert_eq!(
            actions(&db, project),
            vec![
                ChangeAction::FeatureCreated,
                ChangeAction::StatusChanged,
                ChangeAction::PriorityChanged,
                ChangeAction::SpecUpdated,
                ChangeAction::FeatureUpdated,
            ]
        );
    }

    #[test]
    fn unchanged_values_record_nothing() {
        let (db, project) = setup();
        let board = Board::human(&db);
        let (feature, _) = board
            .create_feature(project, CreateFeatureInput {
                title: "Login".into(),
                priority: Some(Priority::High),
                ..Default::default()
            })
            .unwrap();

        board
            .update_feature(feature.id, UpdateFeatureInput {
                title: Some("Login".into()),
                priority: Some(Priority::High),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(actions(&db, project), vec![ChangeAction::FeatureCreated]);
    }

    #[test]
    fn milestone_from_other_project_is_rejected() {
        let (db, project) = setup();
        let other = db
            .create_project(CreateProjectInput {
                name: "other".into(),
                ..Default::default()
            })
            .unwrap();
        let foreign = db
            .create_milestone(other.id, CreateMilestoneInput {
                name: "v1".into(),
                ..Default::default()
            })
            .unwrap()
            .unwrap();

        let err = Board::human(&db)
            .create_feature(project, CreateFeatureInput {
                title: "x".into(),
                milestone_id: Some(foreign.id),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, BoardError::Invalid { field: "milestone_id", .. }));
    }

    #[test]
    fn subtask_toggle_records_done_and_reopened() {
        let (db, project) = setup();
        let board = Board::human(&db);
        let (feature, _) = board
            .create_feature(project, CreateFeatureInput {
                title: "f".into(),
                ..Default::default()
            })
            .unwrap();
        let subtask = board.create_subtask(feature.id, "write tests".into()).unwrap();

        for status in [SubtaskStatus::Done, SubtaskStatus::Open] {
            board
                .update_subtask(subtask.id, UpdateSubtaskInput {
                    status: Some(status),
                    ..Default::default()
                })
                .unwrap();
        }

        assert_eq!(
            actions(&db, project),
            vec![
                ChangeAction::FeatureCreated,
                ChangeAction::SubtaskCreated,
                ChangeAction::SubtaskDone,
                ChangeAction::SubtaskReopened,
            ]
        );
    }

    #[test]
    fn agent_update_applies_batch_before_fields() {
        let (db, project) = setup();
        let board = Board::agent(&db);
        let (feature, subtasks) = board
            .create_feature(project, CreateFeatureInput {
                title: "f".into(),
                subtasks: vec!["one".into()],
                ..Default::default()
            })
            .unwrap();

        let detail = board
            .apply_agent_update(
                feature.id,
                vec![
                    SubtaskChange::SetStatus {
                        id: subtasks[0].id,
                        status: SubtaskStatus::Done,
                    },
                    SubtaskChange::Create { title: "two".into() },
                ],
                UpdateFeatureInput {
                    status: Some(FeatureStatus::InReview),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(detail.feature.status, FeatureStatus::InReview);
        assert_eq!(detail.subtasks.len(), 2);
        assert!(detail.subtasks[0].status.is_done());
    }

    #[test]
    fn agent_update_with_unknown_subtask_changes_nothing() {
        let (db, project) = setup();
        let board = Board::agent(&db);
        let (feature, _) = board
            .create_feature(project, CreateFeatureInput {
                title: "f".into(),
                ..Default::default()
            })
            .unwrap();

        let err = board
            .apply_agent_update(
                feature.id,
                vec![
                    SubtaskChange::Create { title: "new".into() },
                    SubtaskChange::SetStatus {
                        id: Uuid::new_v4(),
                        status: SubtaskStatus::Done,
                    },
                ],
                UpdateFeatureInput {
                    status: Some(FeatureStatus::Done),
                    ..Default::default()
                },
            )
            .unwrap_err();

        assert!(matches!(err, BoardError::NotFound("subtask")));
        let feature = db.get_feature(feature.id).unwrap().unwrap();
        assert_eq!(feature.status, FeatureStatus::Backlog);
        assert!(db.list_subtasks(feature.id).unwrap().is_empty());
    }

    #[test]
    fn move_of_deleted_feature_is_a_no_op() {
        let (db, _) = setup();
        let moved = Board::human(&db)
            .move_feature(Uuid::new_v4(), FeatureStatus::Todo, 0)
            .unwrap();
        assert!(moved.is_none());
    }
}
