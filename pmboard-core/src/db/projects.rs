use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_ts, now, parse_ts, parse_uuid, Database};
use crate::models::*;

const PROJECT_COLUMNS: &str =
    "id, name, description, repo_url, context_md, created_at, updated_at";

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        name: row.get(1)?,
        description: row.get(2)?,
        repo_url: row.get(3)?,
        context_md: row.get(4)?,
        created_at: parse_ts(5, &row.get::<_, String>(5)?)?,
        updated_at: parse_ts(6, &row.get::<_, String>(6)?)?,
    })
}

pub(crate) fn get_project(conn: &Connection, id: Uuid) -> Result<Option<Project>> {
    conn.query_row(
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
        params![id.to_string()],
        project_from_row,
    )
    .optional()
    .context("Failed to load project")
}

impl Database {
    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let ts = now();
        let project = Project {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            repo_url: input.repo_url,
            context_md: input.context_md,
            created_at: ts,
            updated_at: ts,
        };

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO projects (id, name, description, repo_url, context_md, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    project.id.to_string(),
                    project.name,
                    project.description,
                    project.repo_url,
                    project.context_md,
                    format_ts(&project.created_at),
                    format_ts(&project.updated_at),
                ],
            )
            .context("Failed to insert project")?;
            Ok(())
        })?;

        tracing::info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        self.with_connection(|conn| get_project(conn, id))
    }

    pub fn get_project_summary(&self, id: Uuid) -> Result<Option<ProjectSummary>> {
        self.with_connection(|conn| {
            let Some(project) = get_project(conn, id)? else {
                return Ok(None);
            };
            let feature_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM features WHERE project_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            Ok(Some(ProjectSummary {
                project,
                feature_count,
            }))
        })
    }

    /// All projects, newest first, with their feature counts.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.name, p.description, p.repo_url, p.context_md, p.created_at, p.updated_at,
                        (SELECT COUNT(*) FROM features f WHERE f.project_id = p.id)
                 FROM projects p
                 ORDER BY p.created_at DESC, p.rowid DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ProjectSummary {
                    project: project_from_row(row)?,
                    feature_count: row.get(7)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list projects")
        })
    }

    /// Returns `None` when the project does not exist.
    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        self.with_connection(|conn| {
            let Some(mut project) = get_project(conn, id)? else {
                return Ok(None);
            };

            if let Some(name) = input.name {
                project.name = name;
            }
            if let Some(description) = input.description {
                project.description = description;
            }
            if let Some(repo_url) = input.repo_url {
                project.repo_url = repo_url;
            }
            if let Some(context_md) = input.context_md {
                project.context_md = context_md;
            }
            project.updated_at = now();

            conn.execute(
                "UPDATE projects SET name = ?1, description = ?2, repo_url = ?3, context_md = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    project.name,
                    project.description,
                    project.repo_url,
                    project.context_md,
                    format_ts(&project.updated_at),
                    id.to_string(),
                ],
            )
            .context("Failed to update project")?;

            Ok(Some(project))
        })
    }

    /// Deletes the project and everything it owns. Returns `false` when it
    /// did not exist.
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let deleted = self.with_connection(|conn| {
            conn.execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])
                .context("Failed to delete project")
        })?;
        if deleted > 0 {
            tracing::info!(project_id = %id, "project deleted");
        }
        Ok(deleted > 0)
    }
}
