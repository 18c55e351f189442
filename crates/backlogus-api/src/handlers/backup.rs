//! Backup download and upload handlers.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;

use backlogus_core::ImportSummary;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::AppState;

/// Multipart field names accepted for the uploaded archive.
const UPLOAD_FIELDS: [&str; 2] = ["backup", "file"];

#[derive(Debug, Serialize)]
pub struct ImportBackupResponse {
    pub success: bool,
    pub message: String,
    pub imported: ImportSummary,
}

/// Attachment name for an export taken today.
pub fn export_filename(date: chrono::NaiveDate) -> String {
    format!("backlogus-backup-{}.zip", date.format("%Y-%m-%d"))
}

/// Download the caller's backup as a zip attachment.
pub async fn export_backup(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state
        .backup_service()
        .export(auth.user_id)
        .await
        .map_err(|e| ApiError::with_context(e, "Failed to export backup"))?;

    let filename = export_filename(chrono::Utc::now().date_naive());
    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];

    Ok((StatusCode::OK, headers, bytes))
}

/// Replace the caller's library with an uploaded backup.
pub async fn import_backup(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let max_bytes = state.config.max_upload_bytes;
    let upload_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::upload_too_large(max_bytes)
        } else {
            ApiError::BadRequest(format!("Failed to read upload: {}", e.body_text()))
        }
    };

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let is_file = field.file_name().is_some()
            || field.name().is_some_and(|name| UPLOAD_FIELDS.contains(&name));
        if !is_file {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !filename.to_ascii_lowercase().ends_with(".zip") {
            return Err(ApiError::BadRequest(
                "Invalid file type. Please upload a .zip backup file".to_string(),
            ));
        }

        let data = field.bytes().await.map_err(upload_error)?;
        upload = Some((filename, data.to_vec()));
        break;
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::BadRequest("No backup file provided".to_string()))?;

    info!(
        subsystem = "backup",
        component = "backup_handler",
        op = "import_upload",
        user_id = auth.user_id,
        filename = %filename,
        size_bytes = data.len(),
        "Backup upload received"
    );

    let summary = state
        .backup_service()
        .import(auth.user_id, data)
        .await
        .map_err(|e| ApiError::with_context(e, "Failed to import backup"))?;

    Ok(Json(ImportBackupResponse {
        success: true,
        message: "Backup imported successfully".to_string(),
        imported: summary,
    }))
}
