use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{features, format_ts, now, parse_ts, parse_uuid, Database};
use crate::models::*;

const ATTACHMENT_COLUMNS: &str =
    "id, feature_id, filename, original_name, mime_type, size, url, created_at";

fn attachment_from_row(row: &Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        feature_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        filename: row.get(2)?,
        original_name: row.get(3)?,
        mime_type: row.get(4)?,
        size: row.get(5)?,
        url: row.get(6)?,
        created_at: parse_ts(7, &row.get::<_, String>(7)?)?,
    })
}

pub(crate) fn list_attachments(conn: &Connection, feature_id: Uuid) -> Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM attachments WHERE feature_id = ?1 ORDER BY created_at ASC, rowid ASC",
        ATTACHMENT_COLUMNS
    ))?;
    let rows = stmt.query_map(params![feature_id.to_string()], attachment_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list attachments")
}

impl Database {
    /// Records an uploaded file. Returns `None` when the feature does not
    /// exist.
    pub fn create_attachment(
        &self,
        feature_id: Uuid,
        input: CreateAttachmentInput,
    ) -> Result<Option<Attachment>> {
        self.with_connection(|conn| {
            if features::get_feature(conn, feature_id)?.is_none() {
                return Ok(None);
            }
            let attachment = Attachment {
                id: Uuid::new_v4(),
                feature_id,
                filename: input.filename,
                original_name: input.original_name,
                mime_type: input.mime_type,
                size: input.size,
                url: input.url,
                created_at: now(),
            };
            conn.execute(
                "INSERT INTO attachments (id, feature_id, filename, original_name, mime_type, size, url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    attachment.id.to_string(),
                    attachment.feature_id.to_string(),
                    attachment.filename,
                    attachment.original_name,
                    attachment.mime_type,
                    attachment.size,
                    attachment.url,
                    format_ts(&attachment.created_at),
                ],
            )
            .context("Failed to insert attachment")?;
            Ok(Some(attachment))
        })
    }

    pub fn list_attachments(&self, feature_id: Uuid) -> Result<Vec<Attachment>> {
        self.with_connection(|conn| list_attachments(conn, feature_id))
    }

    /// Attachments of every feature in a project, used to clean up stored
    /// files before the project is deleted.
    pub fn list_project_attachments(&self, project_id: Uuid) -> Result<Vec<Attachment>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.feature_id, a.filename, a.original_name, a.mime_type, a.size, a.url, a.created_at
                 FROM attachments a
                 JOIN features f ON f.id = a.feature_id
                 WHERE f.project_id = ?1
                 ORDER BY a.created_at ASC, a.rowid ASC",
            )?;
            let rows = stmt.query_map(params![project_id.to_string()], attachment_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list project attachments")
        })
    }

    /// Removes the record if it belongs to `feature_id` and returns it, so
    /// the caller can delete the stored blob.
    pub fn delete_attachment(&self, feature_id: Uuid, id: Uuid) -> Result<Option<Attachment>> {
        self.with_connection(|conn| {
            let attachment = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM attachments WHERE id = ?1 AND feature_id = ?2",
                        ATTACHMENT_COLUMNS
                    ),
                    params![id.to_string(), feature_id.to_string()],
                    attachment_from_row,
                )
                .optional()?;
            if attachment.is_some() {
                conn.execute("DELETE FROM attachments WHERE id = ?1", params![id.to_string()])
                    .context("Failed to delete attachment")?;
            }
            Ok(attachment)
        })
    }
}
