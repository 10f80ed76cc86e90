use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{feature_in_project, ApiError, ApiPath, AppState};
use crate::models::*;

const FILE_FIELD: &str = "file";
const FALLBACK_MIME: &str = "application/octet-stream";

/// Stores the `file` part of a multipart upload and records it on the
/// feature.
pub async fn upload(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id)): ApiPath<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Attachment>), ApiError> {
    state
        .run(move |db| feature_in_project(db, project_id, feature_id))
        .await?;

    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("upload")
            .to_string();
        let mime_type = field.content_type().unwrap_or(FALLBACK_MIME).to_string();
        let bytes = field.bytes().await?;
        file = Some((original_name, mime_type, bytes));
        break;
    }
    let Some((original_name, mime_type, bytes)) = file else {
        return Err(ApiError::invalid(FILE_FIELD, "a file is required"));
    };

    let stored = state.uploads.save(&original_name, &bytes).await?;
    let input = CreateAttachmentInput {
        filename: stored.filename.clone(),
        original_name,
        mime_type,
        size: stored.size,
        url: stored.url,
    };
    let created = state
        .run(move |db| Ok(db.create_attachment(feature_id, input)?))
        .await;

    match created {
        Ok(Some(attachment)) => {
            tracing::info!(
                feature_id = %feature_id,
                attachment_id = %attachment.id,
                size = attachment.size,
                "stored attachment"
            );
            Ok((StatusCode::CREATED, Json(attachment)))
        }
        Ok(None) => {
            state.uploads.remove(&stored.filename).await;
            Err(ApiError::NotFound("feature"))
        }
        Err(err) => {
            state.uploads.remove(&stored.filename).await;
            Err(err)
        }
    }
}

/// Deletes the attachment record and then its stored file.
pub async fn delete(
    State(state): State<AppState>,
    ApiPath((project_id, feature_id, attachment_id)): ApiPath<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let attachment = state
        .run(move |db| {
            feature_in_project(db, project_id, feature_id)?;
            db.delete_attachment(feature_id, attachment_id)?
                .ok_or(ApiError::NotFound("attachment"))
        })
        .await?;

    state.uploads.remove(&attachment.filename).await;
    Ok(StatusCode::NO_CONTENT)
}
