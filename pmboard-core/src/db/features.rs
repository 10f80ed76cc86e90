use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_ts, now, parse_enum, parse_opt_uuid, parse_ts, parse_uuid, Database};
use super::{attachments, projects, subtasks};
use crate::models::*;
use crate::ordering;

const FEATURE_COLUMNS: &str = "f.id, f.project_id, f.milestone_id, f.title, f.description, f.spec, \
     f.priority, f.status, f.position, f.branch_url, f.pr_url, f.created_at, f.updated_at";

/// Scope order with an explicit tie-break for equal positions.
const SCOPE_ORDER: &str = "f.position ASC, f.created_at ASC, f.rowid ASC";

fn feature_from_row(row: &Row) -> rusqlite::Result<Feature> {
    Ok(Feature {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        project_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        milestone_id: parse_opt_uuid(2, row.get(2)?)?,
        title: row.get(3)?,
        description: row.get(4)?,
        spec: row.get(5)?,
        priority: parse_enum(6, &row.get::<_, String>(6)?, Priority::from_str)?,
        status: parse_enum(7, &row.get::<_, String>(7)?, FeatureStatus::from_str)?,
        position: row.get(8)?,
        branch_url: row.get(9)?,
        pr_url: row.get(10)?,
        created_at: parse_ts(11, &row.get::<_, String>(11)?)?,
        updated_at: parse_ts(12, &row.get::<_, String>(12)?)?,
    })
}

fn status_rank_sql() -> String {
    let arms: String = FeatureStatus::ALL
        .iter()
        .map(|s| format!(" WHEN '{}' THEN {}", s.as_str(), s.rank()))
        .collect();
    format!("CASE f.status{} END", arms)
}

pub(crate) fn get_feature(conn: &Connection, id: Uuid) -> Result<Option<Feature>> {
    conn.query_row(
        &format!("SELECT {} FROM features f WHERE f.id = ?1", FEATURE_COLUMNS),
        params![id.to_string()],
        feature_from_row,
    )
    .optional()
    .context("Failed to load feature")
}

fn max_position(conn: &Connection, project_id: Uuid, status: FeatureStatus) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT MAX(position) FROM features WHERE project_id = ?1 AND status = ?2",
        params![project_id.to_string(), status.as_str()],
        |row| row.get(0),
    )
    .context("Failed to read max feature position")
}

fn scope_ids(
    conn: &Connection,
    project_id: Uuid,
    status: FeatureStatus,
    exclude: Option<Uuid>,
) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT f.id FROM features f
         WHERE f.project_id = ?1 AND f.status = ?2 AND f.id != ?3
         ORDER BY {}",
        SCOPE_ORDER
    ))?;
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
    let rows = stmt.query_map(
        params![project_id.to_string(), status.as_str(), exclude],
        |row| parse_uuid(0, &row.get::<_, String>(0)?),
    )?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list feature scope")
}

fn write_feature(conn: &Connection, feature: &Feature) -> Result<()> {
    conn.execute(
        "UPDATE features SET milestone_id = ?1, title = ?2, description = ?3, spec = ?4, priority = ?5,
                status = ?6, position = ?7, branch_url = ?8, pr_url = ?9, updated_at = ?10
         WHERE id = ?11",
        params![
            feature.milestone_id.map(|id| id.to_string()),
            feature.title,
            feature.description,
            feature.spec,
            feature.priority.as_str(),
            feature.status.as_str(),
            feature.position,
            feature.branch_url,
            feature.pr_url,
            format_ts(&feature.updated_at),
            feature.id.to_string(),
        ],
    )
    .context("Failed to update feature")?;
    Ok(())
}

/// Result of a drag-and-drop move.
#[derive(Debug, Clone)]
pub enum MoveOutcome {
    Moved { before: Feature, after: Feature },
    /// The feature was deleted before the move committed.
    Missing,
}

impl Database {
    /// Appends a new feature to the end of its status column. Initial
    /// subtasks are created in the same transaction. Returns `None` when the
    /// project does not exist.
    pub fn create_feature(
        &self,
        project_id: Uuid,
        input: CreateFeatureInput,
    ) -> Result<Option<(Feature, Vec<Subtask>)>> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            if projects::get_project(&tx, project_id)?.is_none() {
                return Ok(None);
            }

            let status = input.status.unwrap_or_default();
            let ts = now();
            let feature = Feature {
                id: Uuid::new_v4(),
                project_id,
                milestone_id: input.milestone_id,
                title: input.title,
                description: input.description,
                spec: input.spec,
                priority: input.priority.unwrap_or_default(),
                status,
                position: ordering::next_position(max_position(&tx, project_id, status)?),
                branch_url: input.branch_url,
                pr_url: input.pr_url,
                created_at: ts,
                updated_at: ts,
            };

            tx.execute(
                "INSERT INTO features (id, project_id, milestone_id, title, description, spec, priority, status,
                                       position, branch_url, pr_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    feature.id.to_string(),
                    feature.project_id.to_string(),
                    feature.milestone_id.map(|id| id.to_string()),
                    feature.title,
                    feature.description,
                    feature.spec,
                    feature.priority.as_str(),
                    feature.status.as_str(),
                    feature.position,
                    feature.branch_url,
                    feature.pr_url,
                    format_ts(&feature.created_at),
                    format_ts(&feature.updated_at),
                ],
            )
            .context("Failed to insert feature")?;

            let mut created = Vec::with_capacity(input.subtasks.len());
            for title in input.subtasks {
                created.push(subtasks::insert_subtask(&tx, feature.id, title)?);
            }

            tx.commit().context("Failed to commit feature creation")?;
            tracing::debug!(
                feature_id = %feature.id,
                status = feature.status.as_str(),
                position = feature.position,
                "feature created"
            );
            Ok(Some((feature, created)))
        })
    }

    pub fn get_feature(&self, id: Uuid) -> Result<Option<Feature>> {
        self.with_connection(|conn| get_feature(conn, id))
    }

    /// Looks a feature up only if it belongs to `project_id`.
    pub fn get_project_feature(&self, project_id: Uuid, id: Uuid) -> Result<Option<Feature>> {
        Ok(self
            .get_feature(id)?
            .filter(|feature| feature.project_id == project_id))
    }

    pub fn get_feature_detail(&self, id: Uuid) -> Result<Option<FeatureDetail>> {
        self.with_connection(|conn| {
            let Some(feature) = get_feature(conn, id)? else {
                return Ok(None);
            };
            let project = projects::get_project(conn, feature.project_id)?
                .context("Feature references a missing project")?;
            Ok(Some(FeatureDetail {
                subtasks: subtasks::list_subtasks(conn, id)?,
                attachments: attachments::list_attachments(conn, id)?,
                project: ProjectRef {
                    id: project.id,
                    name: project.name,
                },
                feature,
            }))
        })
    }

    /// Features with subtask progress, ordered by status column then
    /// position.
    pub fn list_features(&self, filter: &FeatureFilter) -> Result<Vec<FeatureSummary>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(project_id) = filter.project_id {
            conditions.push("f.project_id = ?");
            values.push(Value::Text(project_id.to_string()));
        }
        if let Some(status) = filter.status {
            conditions.push("f.status = ?");
            values.push(Value::Text(status.as_str().into()));
        }
        if let Some(priority) = filter.priority {
            conditions.push("f.priority = ?");
            values.push(Value::Text(priority.as_str().into()));
        }
        if let Some(query) = filter.query.as_deref().filter(|q| !q.trim().is_empty()) {
            conditions.push(
                "(f.title LIKE ? ESCAPE '\\' OR f.description LIKE ? ESCAPE '\\' OR f.spec LIKE ? ESCAPE '\\')",
            );
            let pattern = format!("%{}%", escape_like(query.trim()));
            for _ in 0..3 {
                values.push(Value::Text(pattern.clone()));
            }
        }

        let mut sql = format!(
            "SELECT {},
                    (SELECT COUNT(*) FROM subtasks s WHERE s.feature_id = f.id),
                    (SELECT COUNT(*) FROM subtasks s WHERE s.feature_id = f.id AND s.status = 'DONE')
             FROM features f",
            FEATURE_COLUMNS
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {}, {}", status_rank_sql(), SCOPE_ORDER));
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok(FeatureSummary {
                    feature: feature_from_row(row)?,
                    subtask_count: row.get(13)?,
                    subtasks_done: row.get(14)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list features")
        })
    }

    /// Applies a field update and returns `(before, after)`, or `None` when
    /// the feature does not exist.
    ///
    /// A status change through this path appends the feature to the end of
    /// its new column. The old column keeps its gap, as with
    /// [`Database::move_feature`].
    pub fn update_feature(
        &self,
        id: Uuid,
        input: UpdateFeatureInput,
    ) -> Result<Option<(Feature, Feature)>> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let Some(before) = get_feature(&tx, id)? else {
                return Ok(None);
            };
            let mut after = before.clone();

            if let Some(title) = input.title {
                after.title = title;
            }
            if let Some(description) = input.description {
                after.description = description;
            }
            if let Some(spec) = input.spec {
                after.spec = spec;
            }
            if let Some(priority) = input.priority {
                after.priority = priority;
            }
            if let Some(branch_url) = input.branch_url {
                after.branch_url = branch_url;
            }
            if let Some(pr_url) = input.pr_url {
                after.pr_url = pr_url;
            }
            if let Some(milestone_id) = input.milestone_id {
                after.milestone_id = milestone_id;
            }
            if let Some(status) = input.status.filter(|s| *s != before.status) {
                after.status = status;
                after.position =
                    ordering::next_position(max_position(&tx, before.project_id, status)?);
            }
            after.updated_at = now();

            write_feature(&tx, &after)?;
            tx.commit().context("Failed to commit feature update")?;
            Ok(Some((before, after)))
        })
    }

    /// Drag-and-drop move of a feature to `index` within the `status` column
    /// of its project.
    ///
    /// Within the same column the whole column is renumbered densely. Across
    /// columns, items at or after `index` in the target column shift up by
    /// one and the source column is left as is. Either way the rewrite is a
    /// single transaction.
    pub fn move_feature(&self, id: Uuid, status: FeatureStatus, index: usize) -> Result<MoveOutcome> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let Some(before) = get_feature(&tx, id)? else {
                return Ok(MoveOutcome::Missing);
            };
            let ts = now();
            let ts_text = format_ts(&ts);

            if status == before.status {
                let ids = scope_ids(&tx, before.project_id, status, None)?;
                let Some(plan) = ordering::reorder_within(&ids, id, index) else {
                    return Ok(MoveOutcome::Missing);
                };
                let mut stmt =
                    tx.prepare("UPDATE features SET position = ?1 WHERE id = ?2 AND position != ?1")?;
                for (item, position) in plan {
                    stmt.execute(params![position, item.to_string()])?;
                }
                drop(stmt);
            } else {
                let len = scope_ids(&tx, before.project_id, status, Some(id))?.len();
                let position = ordering::insertion_index(len, index);
                tx.execute(
                    "UPDATE features SET position = position + 1
                     WHERE project_id = ?1 AND status = ?2 AND position >= ?3 AND id != ?4",
                    params![before.project_id.to_string(), status.as_str(), position, id.to_string()],
                )?;
                tx.execute(
                    "UPDATE features SET status = ?1, position = ?2 WHERE id = ?3",
                    params![status.as_str(), position, id.to_string()],
                )?;
            }

            tx.execute(
                "UPDATE features SET updated_at = ?1 WHERE id = ?2",
                params![ts_text, id.to_string()],
            )?;
            let after = get_feature(&tx, id)?.context("Feature vanished inside its own move")?;
            tx.commit().context("Failed to commit feature move")?;

            tracing::debug!(
                feature_id = %id,
                from = before.status.as_str(),
                to = after.status.as_str(),
                position = after.position,
                "feature moved"
            );
            Ok(MoveOutcome::Moved { before, after })
        })
    }

    /// Deletes a feature with its subtasks and attachments, returning the
    /// deleted row and its attachments so callers can log and clean up.
    pub fn delete_feature(&self, id: Uuid) -> Result<Option<(Feature, Vec<Attachment>)>> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let Some(feature) = get_feature(&tx, id)? else {
                return Ok(None);
            };
            let attachments = attachments::list_attachments(&tx, id)?;
            tx.execute("DELETE FROM features WHERE id = ?1", params![id.to_string()])
                .context("Failed to delete feature")?;
            tx.commit()?;
            Ok(Some((feature, attachments)))
        })
    }

    /// Features of a project with their subtasks, in board order.
    pub fn list_project_features_with_subtasks(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<(Feature, Vec<Subtask>)>> {
        self.with_connection(|conn| {
            let conn: &Connection = conn;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM features f WHERE f.project_id = ?1 ORDER BY {}, {}",
                FEATURE_COLUMNS,
                status_rank_sql(),
                SCOPE_ORDER
            ))?;
            let features = stmt
                .query_map(params![project_id.to_string()], feature_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            features
                .into_iter()
                .map(|feature| {
                    let subtasks = subtasks::list_subtasks(conn, feature.id)?;
                    Ok((feature, subtasks))
                })
                .collect()
        })
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
