use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend};
use crate::object_store::{self, FolderEntry};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteEntryParams {
    pub name: String,
}

/// Entry names address a single object directly under the folder. Path
/// separators and dot segments would escape the folder prefix.
fn validate_entry_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ApiError::bad_request(
            "name must be a plain file name without path separators",
        ));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Folder view over the flat object namespace. All-or-nothing: a single
/// unresolvable entry fails the whole listing.
pub async fn list_folder(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
) -> Result<Json<JSend<Vec<FolderEntry>>>, ApiError> {
    let entries = object_store::list_folder(state.object_store.as_ref(), &folder).await?;
    Ok(JSend::success(entries))
}

pub async fn upload_entry(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut file_data: Option<BytesMut> = None;
    let mut file_name: Option<String> = None;
    let mut name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }

                let mut buf = BytesMut::with_capacity(data.len());
                buf.extend_from_slice(&data);
                file_data = Some(buf);
            }
            "name" => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid name: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let name = name
        .or(file_name)
        .ok_or_else(|| ApiError::bad_request("name field or filename is required"))?;

    validate_entry_name(&name)?;

    let key =
        object_store::upload_entry(state.object_store.as_ref(), &folder, &name, file_data.freeze())
            .await?;

    tracing::debug!(%key, "Uploaded folder entry");
    Ok(JSend::success(UploadResponse { name, key }))
}

pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    AppQuery(params): AppQuery<DeleteEntryParams>,
) -> Result<Json<JSend<()>>, ApiError> {
    validate_entry_name(&params.name)?;

    object_store::delete_entry(state.object_store.as_ref(), &folder, &params.name).await?;

    tracing::debug!(folder = %folder, name = %params.name, "Deleted folder entry");
    Ok(JSend::success(()))
}
