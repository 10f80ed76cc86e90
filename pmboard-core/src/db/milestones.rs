use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_ts, now, parse_date, parse_enum, parse_ts, parse_uuid, projects, Database};
use crate::models::*;
use crate::ordering;

const MILESTONE_COLUMNS: &str =
    "id, project_id, name, description, target_date, position, created_at, updated_at";

fn milestone_from_row(row: &Row) -> rusqlite::Result<Milestone> {
    Ok(Milestone {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        project_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        name: row.get(2)?,
        description: row.get(3)?,
        target_date: parse_date(4, row.get(4)?)?,
        position: row.get(5)?,
        created_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_ts(7, &row.get::<_, String>(7)?)?,
    })
}

fn get_milestone(conn: &Connection, id: Uuid) -> Result<Option<Milestone>> {
    conn.query_row(
        &format!("SELECT {} FROM milestones WHERE id = ?1", MILESTONE_COLUMNS),
        params![id.to_string()],
        milestone_from_row,
    )
    .optional()
    .context("Failed to load milestone")
}

fn list_milestones(conn: &Connection, project_id: Uuid) -> Result<Vec<Milestone>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM milestones WHERE project_id = ?1
         ORDER BY position ASC, created_at ASC, rowid ASC",
        MILESTONE_COLUMNS
    ))?;
    let rows = stmt.query_map(params![project_id.to_string()], milestone_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list milestones")
}

fn milestone_features(conn: &Connection, milestone_id: Uuid) -> Result<Vec<MilestoneFeature>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.title, f.status, f.priority,
                (SELECT COUNT(*) FROM subtasks s WHERE s.feature_id = f.id)
         FROM features f
         WHERE f.milestone_id = ?1
         ORDER BY f.position ASC, f.created_at ASC, f.rowid ASC",
    )?;
    let rows = stmt.query_map(params![milestone_id.to_string()], |row| {
        Ok(MilestoneFeature {
            id: parse_uuid(0, &row.get::<_, String>(0)?)?,
            title: row.get(1)?,
            status: parse_enum(2, &row.get::<_, String>(2)?, FeatureStatus::from_str)?,
            priority: parse_enum(3, &row.get::<_, String>(3)?, Priority::from_str)?,
            subtask_count: row.get(4)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list milestone features")
}

impl Database {
    /// Inserts a milestone at its requested roadmap index, shifting later
    /// ones down. Returns `None` when the project does not exist.
    pub fn create_milestone(
        &self,
        project_id: Uuid,
        input: CreateMilestoneInput,
    ) -> Result<Option<Milestone>> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            if projects::get_project(&tx, project_id)?.is_none() {
                return Ok(None);
            }

            let existing: Vec<Uuid> = list_milestones(&tx, project_id)?
                .into_iter()
                .map(|m| m.id)
                .collect();
            let position = ordering::insertion_index(
                existing.len(),
                input.position.unwrap_or(existing.len()),
            );
            {
                let mut stmt = tx.prepare("UPDATE milestones SET position = ?1 WHERE id = ?2")?;
                for (index, id) in existing.iter().enumerate() {
                    let index = index as i64;
                    let shifted = if index < position { index } else { index + 1 };
                    stmt.execute(params![shifted, id.to_string()])?;
                }
            }

            let ts = now();
            let milestone = Milestone {
                id: Uuid::new_v4(),
                project_id,
                name: input.name,
                description: input.description,
                target_date: input.target_date,
                position,
                created_at: ts,
                updated_at: ts,
            };
            tx.execute(
                "INSERT INTO milestones (id, project_id, name, description, target_date, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    milestone.id.to_string(),
                    milestone.project_id.to_string(),
                    milestone.name,
                    milestone.description,
                    milestone.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    milestone.position,
                    format_ts(&milestone.created_at),
                    format_ts(&milestone.updated_at),
                ],
            )
            .context("Failed to insert milestone")?;
            tx.commit()?;
            Ok(Some(milestone))
        })
    }

    pub fn get_milestone(&self, id: Uuid) -> Result<Option<Milestone>> {
        self.with_connection(|conn| get_milestone(conn, id))
    }

    /// Looks a milestone up only if it belongs to `project_id`.
    pub fn get_project_milestone(&self, project_id: Uuid, id: Uuid) -> Result<Option<Milestone>> {
        Ok(self
            .get_milestone(id)?
            .filter(|milestone| milestone.project_id == project_id))
    }

    pub fn list_milestones(&self, project_id: Uuid) -> Result<Vec<Milestone>> {
        self.with_connection(|conn| list_milestones(conn, project_id))
    }

    /// Milestones in roadmap order, each with its assigned features.
    pub fn list_milestones_with_features(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<MilestoneWithFeatures>> {
        self.with_connection(|conn| {
            list_milestones(conn, project_id)?
                .into_iter()
                .map(|milestone| {
                    let features = milestone_features(conn, milestone.id)?;
                    Ok(MilestoneWithFeatures {
                        milestone,
                        features,
                    })
                })
                .collect()
        })
    }

    pub fn update_milestone(
        &self,
        id: Uuid,
        input: UpdateMilestoneInput,
    ) -> Result<Option<MilestoneWithFeatures>> {
        self.with_connection(|conn| {
            let Some(mut milestone) = get_milestone(conn, id)? else {
                return Ok(None);
            };
            if let Some(name) = input.name {
                milestone.name = name;
            }
            if let Some(description) = input.description {
                milestone.description = description;
            }
            if let Some(target_date) = input.target_date {
                milestone.target_date = target_date;
            }
            milestone.updated_at = now();

            conn.execute(
                "UPDATE milestones SET name = ?1, description = ?2, target_date = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    milestone.name,
                    milestone.description,
                    milestone.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    format_ts(&milestone.updated_at),
                    id.to_string(),
                ],
            )
            .context("Failed to update milestone")?;

            let features = milestone_features(conn, id)?;
            Ok(Some(MilestoneWithFeatures {
                milestone,
                features,
            }))
        })
    }

    /// Moves a milestone to `index` on the roadmap and renumbers the
    /// project's milestones densely. Returns `false` if it vanished.
    pub fn reorder_milestone(&self, id: Uuid, index: usize) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let Some(milestone) = get_milestone(&tx, id)? else {
                return Ok(false);
            };
            let ids: Vec<Uuid> = list_milestones(&tx, milestone.project_id)?
                .into_iter()
                .map(|m| m.id)
                .collect();
            let Some(plan) = ordering::reorder_within(&ids, id, index) else {
                return Ok(false);
            };
            {
                let mut stmt = tx.prepare("UPDATE milestones SET position = ?1 WHERE id = ?2")?;
                for (item, position) in plan {
                    stmt.execute(params![position, item.to_string()])?;
                }
            }
            tx.commit().context("Failed to commit milestone reorder")?;
            Ok(true)
        })
    }

    /// Deletes a milestone; its features become unscheduled.
    pub fn delete_milestone(&self, id: Uuid) -> Result<bool> {
        let deleted = self.with_connection(|conn| {
            conn.execute("DELETE FROM milestones WHERE id = ?1", params![id.to_string()])
                .context("Failed to delete milestone")
        })?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

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

    fn milestone(db: &Database, project: Uuid, name: &str) -> Milestone {
        db.create_milestone(project, CreateMilestoneInput {
            name: name.into(),
            ..Default::default()
        })
        .unwrap()
        .unwrap()
    }

    #[test]
    fn milestones_append_to_roadmap() {
        let (db, project) = setup();
        assert_eq!(milestone(&db, project, "v1").position, 0);
        assert_eq!(milestone(&db, project, "v2").position, 1);
    }

    fn roadmap(db: &Database, project: Uuid) -> Vec<(String, i64)> {
        db.list_milestones(project)
            .unwrap()
            .into_iter()
            .map(|m| (m.name, m.position))
            .collect()
    }

    fn milestone_at(db: &Database, project: Uuid, name: &str, position: usize) -> Milestone {
        db.create_milestone(project, CreateMilestoneInput {
            name: name.into(),
            position: Some(position),
            ..Default::default()
        })
        .unwrap()
        .unwrap()
    }

    #[test]
    fn explicit_positions_keep_roadmap_dense() {
        let (db, project) = setup();
        milestone(&db, project, "v1");
        milestone(&db, project, "v2");

        assert_eq!(milestone_at(&db, project, "v0", 0).position, 0);
        assert_eq!(milestone_at(&db, project, "v1.5", 2).position, 2);
        assert_eq!(milestone_at(&db, project, "far", 99).position, 4);

        assert_eq!(
            roadmap(&db, project),
            vec![
                ("v0".into(), 0),
                ("v1".into(), 1),
                ("v1.5".into(), 2),
                ("v2".into(), 3),
                ("far".into(), 4),
            ]
        );
    }

    #[test]
    fn target_date_round_trips() {
        let (db, project) = setup();
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let created = db
            .create_milestone(project, CreateMilestoneInput {
                name: "v1".into(),
                target_date: Some(date),
                ..Default::default()
            })
            .unwrap()
            .unwrap();

        let loaded = db.get_milestone(created.id).unwrap().unwrap();
        assert_eq!(loaded.target_date, Some(date));
    }

    #[test]
    fn reorder_renumbers_roadmap() {
        let (db, project) = setup();
        let v1 = milestone(&db, project, "v1");
        milestone(&db, project, "v2");
        milestone(&db, project, "v3");

        assert!(db.reorder_milestone(v1.id, 2).unwrap());

        let order: Vec<(String, i64)> = db
            .list_milestones(project)
            .unwrap()
            .into_iter()
            .map(|m| (m.name, m.position))
            .collect();
        assert_eq!(
            order,
            vec![("v2".into(), 0), ("v3".into(), 1), ("v1".into(), 2)]
        );
    }

    #[test]
    fn deleting_milestone_unschedules_features() {
        let (db, project) = setup();
        let v1 = milestone(&db, project, "v1");
        let (feature, _) = db
            .create_feature(project, CreateFeatureInput {
                title: "f".into(),
                milestone_id: Some(v1.id),
                ..Default::default()
            })
            .unwrap()
            .unwrap();

        let roadmap = db.list_milestones_with_features(project).unwrap();
        assert_eq!(roadmap[0].features.len(), 1);

        assert!(db.delete_milestone(v1.id).unwrap());
        let feature = db.get_feature(feature.id).unwrap().unwrap();
        assert_eq!(feature.milestone_id, None);
    }
}
