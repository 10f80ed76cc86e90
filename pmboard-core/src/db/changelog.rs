use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{format_ts, now, parse_enum, parse_opt_uuid, parse_ts, parse_uuid, Database};
use crate::dedupe::dedupe_changelog;
use crate::models::*;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

const ENTRY_COLUMNS: &str = "id, project_id, action, summary, feature_id, feature_title, \
     subtask_id, subtask_title, meta, source, created_at";

const NEWEST_FIRST: &str = "created_at DESC, rowid DESC";

fn entry_from_row(row: &Row) -> rusqlite::Result<ChangeLogEntry> {
    let meta = row
        .get::<_, Option<String>>(8)?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, e.into())
            })
        })
        .transpose()?;

    Ok(ChangeLogEntry {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        project_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        action: parse_enum(2, &row.get::<_, String>(2)?, ChangeAction::from_str)?,
        summary: row.get(3)?,
        feature_id: parse_opt_uuid(4, row.get(4)?)?,
        feature_title: row.get(5)?,
        subtask_id: parse_opt_uuid(6, row.get(6)?)?,
        subtask_title: row.get(7)?,
        meta,
        source: parse_enum(9, &row.get::<_, String>(9)?, ChangeSource::from_str)?,
        created_at: parse_ts(10, &row.get::<_, String>(10)?)?,
    })
}

fn query_entries(
    conn: &Connection,
    project_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<ChangeLogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM change_log WHERE project_id = ?1 ORDER BY {} LIMIT ?2 OFFSET ?3",
        ENTRY_COLUMNS, NEWEST_FIRST
    ))?;
    let rows = stmt.query_map(
        params![project_id.to_string(), limit, offset],
        entry_from_row,
    )?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read change log")
}

impl Database {
    /// Appends an entry. Entries are never updated afterwards.
    pub fn append_change(&self, entry: NewChangeLogEntry) -> Result<ChangeLogEntry> {
        let entry = ChangeLogEntry {
            id: Uuid::new_v4(),
            project_id: entry.project_id,
            action: entry.action,
            summary: entry.summary,
            feature_id: entry.feature_id,
            feature_title: entry.feature_title,
            subtask_id: entry.subtask_id,
            subtask_title: entry.subtask_title,
            meta: entry.meta,
            source: entry.source,
            created_at: now(),
        };
        let meta = entry
            .meta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode change meta")?;

        self.with_connection(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO change_log ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    ENTRY_COLUMNS
                ),
                params![
                    entry.id.to_string(),
                    entry.project_id.to_string(),
                    entry.action.as_str(),
                    entry.summary,
                    entry.feature_id.map(|id| id.to_string()),
                    entry.feature_title,
                    entry.subtask_id.map(|id| id.to_string()),
                    entry.subtask_title,
                    meta,
                    entry.source.as_str(),
                    format_ts(&entry.created_at),
                ],
            )
            .context("Failed to append change log entry")
        })?;

        tracing::debug!(
            project_id = %entry.project_id,
            action = entry.action.as_str(),
            source = entry.source.as_str(),
            "change recorded"
        );
        Ok(entry)
    }

    /// The `limit` most recent entries, newest first.
    pub fn recent_changes(&self, project_id: Uuid, limit: u32) -> Result<Vec<ChangeLogEntry>> {
        self.with_connection(|conn| query_entries(conn, project_id, limit as i64, 0))
    }

    /// One page of a project's history, newest first.
    ///
    /// `page` is 1-based and never past the last page; `page_size` is
    /// clamped to `1..=MAX_PAGE_SIZE`. An empty history still has one page.
    /// With `dedupe` the page is collapsed after it is read, so `count` may
    /// be smaller than `page_size` while `total` still counts stored rows.
    pub fn changelog_page(
        &self,
        project_id: Uuid,
        page: u32,
        page_size: u32,
        dedupe: bool,
    ) -> Result<ChangeLogPage> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let (entries, total, page, total_pages) = self.with_connection(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM change_log WHERE project_id = ?1",
                params![project_id.to_string()],
                |row| row.get(0),
            )?;
            let total_pages = ((total as u64).div_ceil(page_size as u64) as u32).max(1);
            let page = page.clamp(1, total_pages);
            let offset = (page as i64 - 1) * page_size as i64;
            let entries = query_entries(conn, project_id, page_size as i64, offset)?;
            Ok((entries, total, page, total_pages))
        })?;

        let data = if dedupe {
            dedupe_changelog(entries)
        } else {
            entries
        };

        Ok(ChangeLogPage {
            count: data.len(),
            data,
            page,
            page_size,
            total,
            total_pages,
            deduped: dedupe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    #[test]
    fn meta_round_trips_as_json() {
        let (db, project) = setup();
        let feature_id = Uuid::new_v4();
        db.append_change(
            NewChangeLogEntry::new(project, ChangeAction::StatusChanged, "moved")
                .feature(feature_id, "Login")
                .meta(json!({ "from": "TODO", "to": "IN_PROGRESS" }))
                .source(ChangeSource::Agent),
        )
        .unwrap();

        let entries = db.recent_changes(project, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].meta, Some(json!({ "from": "TODO", "to": "IN_PROGRESS" })));
        assert_eq!(entries[0].feature_id, Some(feature_id));
        assert_eq!(entries[0].feature_title.as_deref(), Some("Login"));
        assert_eq!(entries[0].source, ChangeSource::Agent);
    }

    #[test]
    fn recent_changes_are_newest_first() {
        let (db, project) = setup();
        for summary in ["first", "second", "third"] {
            db.append_change(NewChangeLogEntry::new(
                project,
                ChangeAction::FeatureCreated,
                summary,
            ))
            .unwrap();
        }

        let summaries: Vec<String> = db
            .recent_changes(project, 2)
            .unwrap()
            .into_iter()
            .map(|e| e.summary)
            .collect();
        assert_eq!(summaries, vec!["third", "second"]);
    }

    #[test]
    fn entries_cannot_be_updated() {
        let (db, project) = setup();
        let entry = db
            .append_change(NewChangeLogEntry::new(project, ChangeAction::FeatureCreated, "x"))
            .unwrap();

        let result = db.with_connection(|conn| {
            conn.execute(
                "UPDATE change_log SET summary = 'rewritten' WHERE id = ?1",
                params![entry.id.to_string()],
            )
            .map_err(Into::into)
        });
        assert!(result.is_err());
        assert_eq!(db.recent_changes(project, 1).unwrap()[0].summary, "x");
    }

    #[test]
    fn pages_report_totals() {
        let (db, project) = setup();
        for i in 0..5 {
            db.append_change(NewChangeLogEntry::new(
                project,
                ChangeAction::FeatureCreated,
                format!("entry {}", i),
            ))
            .unwrap();
        }

        let page = db.changelog_page(project, 2, 2, false).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.count, 2);
        assert_eq!(page.data[0].summary, "entry 2");

        let last = db.changelog_page(project, 3, 2, false).unwrap();
        assert_eq!(last.count, 1);

        let beyond = db.changelog_page(project, 9, 2, false).unwrap();
        assert_eq!(beyond.page, 3);
        assert_eq!(beyond.count, 1);
    }

    #[test]
    fn empty_history_has_one_page() {
        let (db, project) = setup();
        let page = db.changelog_page(project, 4, 10, false).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
        assert!(page.data.is_empty());
    }

    #[test]
    fn page_size_is_clamped() {
        let (db, project) = setup();
        assert_eq!(db.changelog_page(project, 1, 0, false).unwrap().page_size, 1);
        assert_eq!(db.changelog_page(project, 1, 1000, false).unwrap().page_size, MAX_PAGE_SIZE);
        assert_eq!(db.changelog_page(project, 0, 10, false).unwrap().page, 1);
    }

    #[test]
    fn dedupe_collapses_repeated_entries() {
        let (db, project) = setup();
        for _ in 0..3 {
            db.append_change(NewChangeLogEntry::new(
                project,
                ChangeAction::SpecUpdated,
                "Spec updated",
            ))
            .unwrap();
        }

        let page = db.changelog_page(project, 1, 50, true).unwrap();
        assert!(page.deduped);
        assert_eq!(page.count, 1);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn entries_survive_feature_deletion() {
        let (db, project) = setup();
        let (feature, _) = db
            .create_feature(project, CreateFeatureInput {
                title: "gone soon".into(),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        db.append_change(
            NewChangeLogEntry::new(project, ChangeAction::FeatureDeleted, "deleted")
                .feature(feature.id, &feature.title),
        )
        .unwrap();
        db.delete_feature(feature.id).unwrap();

        let entries = db.recent_changes(project, 10).unwrap();
        assert_eq!(entries[0].feature_title.as_deref(), Some("gone soon"));
    }
}
