use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{features, format_ts, now, parse_enum, parse_ts, parse_uuid, Database};
use crate::models::*;
use crate::ordering;

const SUBTASK_COLUMNS: &str = "id, feature_id, title, status, position, created_at, updated_at";

fn subtask_from_row(row: &Row) -> rusqlite::Result<Subtask> {
    Ok(Subtask {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        feature_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        title: row.get(2)?,
        status: parse_enum(3, &row.get::<_, String>(3)?, SubtaskStatus::from_str)?,
        position: row.get(4)?,
        created_at: parse_ts(5, &row.get::<_, String>(5)?)?,
        updated_at: parse_ts(6, &row.get::<_, String>(6)?)?,
    })
}

pub(crate) fn get_subtask(conn: &Connection, id: Uuid) -> Result<Option<Subtask>> {
    conn.query_row(
        &format!("SELECT {} FROM subtasks WHERE id = ?1", SUBTASK_COLUMNS),
        params![id.to_string()],
        subtask_from_row,
    )
    .optional()
    .context("Failed to load subtask")
}

pub(crate) fn list_subtasks(conn: &Connection, feature_id: Uuid) -> Result<Vec<Subtask>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM subtasks WHERE feature_id = ?1 ORDER BY position ASC, created_at ASC, rowid ASC",
        SUBTASK_COLUMNS
    ))?;
    let rows = stmt.query_map(params![feature_id.to_string()], subtask_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list subtasks")
}

/// Appends a subtask to the end of its feature's checklist.
pub(crate) fn insert_subtask(conn: &Connection, feature_id: Uuid, title: String) -> Result<Subtask> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM subtasks WHERE feature_id = ?1",
        params![feature_id.to_string()],
        |row| row.get(0),
    )?;
    let ts = now();
    let subtask = Subtask {
        id: Uuid::new_v4(),
        feature_id,
        title,
        status: SubtaskStatus::Open,
        position: ordering::next_position(max),
        created_at: ts,
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO subtasks (id, feature_id, title, status, position, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            subtask.id.to_string(),
            subtask.feature_id.to_string(),
            subtask.title,
            subtask.status.as_str(),
            subtask.position,
            format_ts(&subtask.created_at),
            format_ts(&subtask.updated_at),
        ],
    )
    .context("Failed to insert subtask")?;
    Ok(subtask)
}

fn write_subtask(conn: &Connection, subtask: &Subtask) -> Result<()> {
    conn.execute(
        "UPDATE subtasks SET title = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            subtask.title,
            subtask.status.as_str(),
            format_ts(&subtask.updated_at),
            subtask.id.to_string(),
        ],
    )
    .context("Failed to update subtask")?;
    Ok(())
}

/// What a batched subtask edit did to one subtask.
#[derive(Debug, Clone)]
pub enum AppliedSubtaskChange {
    Created(Subtask),
    StatusChanged { before: Subtask, after: Subtask },
    Unchanged(Subtask),
}

impl Database {
    /// Returns `None` when the feature does not exist.
    pub fn create_subtask(&self, feature_id: Uuid, title: String) -> Result<Option<Subtask>> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            if features::get_feature(&tx, feature_id)?.is_none() {
                return Ok(None);
            }
            let subtask = insert_subtask(&tx, feature_id, title)?;
            tx.commit()?;
            Ok(Some(subtask))
        })
    }

    pub fn get_subtask(&self, id: Uuid) -> Result<Option<Subtask>> {
        self.with_connection(|conn| get_subtask(conn, id))
    }

    pub fn list_subtasks(&self, feature_id: Uuid) -> Result<Vec<Subtask>> {
        self.with_connection(|conn| list_subtasks(conn, feature_id))
    }

    /// Returns `(before, after)`, or `None` when the subtask does not exist.
    pub fn update_subtask(
        &self,
        id: Uuid,
        input: UpdateSubtaskInput,
    ) -> Result<Option<(Subtask, Subtask)>> {
        self.with_connection(|conn| {
            let Some(before) = get_subtask(conn, id)? else {
                return Ok(None);
            };
            let mut after = before.clone();
            if let Some(title) = input.title {
                after.title = title;
            }
            if let Some(status) = input.status {
                after.status = status;
            }
            after.updated_at = now();
            write_subtask(conn, &after)?;
            Ok(Some((before, after)))
        })
    }

    /// Applies a mixed batch of creations and status updates to one feature
    /// in a single transaction.
    ///
    /// Applies nothing and reports [`BatchError::UnknownSubtask`] if an
    /// update names a subtask that does not belong to `feature_id`.
    pub fn apply_subtask_changes(
        &self,
        feature_id: Uuid,
        changes: Vec<SubtaskChange>,
    ) -> Result<std::result::Result<Vec<AppliedSubtaskChange>, BatchError>> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let mut applied = Vec::with_capacity(changes.len());

            for change in changes {
                match change {
                    SubtaskChange::Create { title } => {
                        applied.push(AppliedSubtaskChange::Created(insert_subtask(
                            &tx, feature_id, title,
                        )?));
                    }
                    SubtaskChange::SetStatus { id, status } => {
                        let Some(before) =
                            get_subtask(&tx, id)?.filter(|s| s.feature_id == feature_id)
                        else {
                            return Ok(Err(BatchError::UnknownSubtask(id)));
                        };
                        if before.status == status {
                            applied.push(AppliedSubtaskChange::Unchanged(before));
                            continue;
                        }
                        let mut after = before.clone();
                        after.status = status;
                        after.updated_at = now();
                        write_subtask(&tx, &after)?;
                        applied.push(AppliedSubtaskChange::StatusChanged { before, after });
                    }
                }
            }

            tx.commit().context("Failed to commit subtask batch")?;
            Ok(Ok(applied))
        })
    }

    /// Moves a subtask to `index` within its feature and renumbers the
    /// checklist densely. Returns `false` if the subtask vanished.
    pub fn reorder_subtask(&self, id: Uuid, index: usize) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let Some(subtask) = get_subtask(&tx, id)? else {
                return Ok(false);
            };
            let ids: Vec<Uuid> = list_subtasks(&tx, subtask.feature_id)?
                .into_iter()
                .map(|s| s.id)
                .collect();
            let Some(plan) = ordering::reorder_within(&ids, id, index) else {
                return Ok(false);
            };
            {
                let mut stmt = tx.prepare("UPDATE subtasks SET position = ?1 WHERE id = ?2")?;
                for (item, position) in plan {
                    stmt.execute(params![position, item.to_string()])?;
                }
            }
            tx.commit().context("Failed to commit subtask reorder")?;
            Ok(true)
        })
    }

    /// Returns the deleted subtask, or `None` if it did not exist.
    pub fn delete_subtask(&self, id: Uuid) -> Result<Option<Subtask>> {
        self.with_connection(|conn| {
            let Some(subtask) = get_subtask(conn, id)? else {
                return Ok(None);
            };
            conn.execute("DELETE FROM subtasks WHERE id = ?1", params![id.to_string()])
                .context("Failed to delete subtask")?;
            Ok(Some(subtask))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    UnknownSubtask(Uuid),
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSubtask(id) => write!(f, "subtask {} not found on this feature", id),
        }
    }
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
        let (feature, _) = db
            .create_feature(project.id, CreateFeatureInput {
                title: "f".into(),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        (db, feature.id)
    }

    fn titles(db: &Database, feature_id: Uuid) -> Vec<(String, i64)> {
        db.list_subtasks(feature_id)
            .unwrap()
            .into_iter()
            .map(|s| (s.title, s.position))
            .collect()
    }

    #[test]
    fn subtasks_append_in_order() {
        let (db, feature) = setup();
        for title in ["a", "b", "c"] {
            db.create_subtask(feature, title.into()).unwrap().unwrap();
        }
        assert_eq!(
            titles(&db, feature),
            vec![("a".into(), 0), ("b".into(), 1), ("c".into(), 2)]
        );
    }

    #[test]
    fn reorder_renumbers_checklist() {
        let (db, feature) = setup();
        let a = db.create_subtask(feature, "a".into()).unwrap().unwrap();
        db.create_subtask(feature, "b".into()).unwrap().unwrap();
        db.create_subtask(feature, "c".into()).unwrap().unwrap();

        assert!(db.reorder_subtask(a.id, 1).unwrap());
        assert_eq!(
            titles(&db, feature),
            vec![("b".into(), 0), ("a".into(), 1), ("c".into(), 2)]
        );
    }

    #[test]
    fn batch_creates_and_updates() {
        let (db, feature) = setup();
        let existing = db.create_subtask(feature, "existing".into()).unwrap().unwrap();

        let applied = db
            .apply_subtask_changes(feature, vec![
                SubtaskChange::Create { title: "new".into() },
                SubtaskChange::SetStatus {
                    id: existing.id,
                    status: SubtaskStatus::Done,
                },
            ])
            .unwrap()
            .unwrap();

        assert!(matches!(applied[0], AppliedSubtaskChange::Created(ref s) if s.position == 1));
        assert!(matches!(
            applied[1],
            AppliedSubtaskChange::StatusChanged { ref after, .. } if after.status == SubtaskStatus::Done
        ));
    }

    #[test]
    fn batch_with_unknown_id_applies_nothing() {
        let (db, feature) = setup();
        let missing = Uuid::new_v4();

        let result = db
            .apply_subtask_changes(feature, vec![
                SubtaskChange::Create { title: "new".into() },
                SubtaskChange::SetStatus {
                    id: missing,
                    status: SubtaskStatus::Done,
                },
            ])
            .unwrap();

        assert_eq!(result.unwrap_err(), BatchError::UnknownSubtask(missing));
        assert!(db.list_subtasks(feature).unwrap().is_empty());
    }

    #[test]
    fn create_on_missing_feature_returns_none() {
        let (db, _) = setup();
        assert!(db.create_subtask(Uuid::new_v4(), "x".into()).unwrap().is_none());
    }
}
