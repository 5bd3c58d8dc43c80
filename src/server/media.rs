use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::media::MediaStorageError;
use crate::server::AppState;
use crate::server::response::ApiError;

/// One part of a multipart upload.
pub struct UploadField {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadField {
    /// Text parts arrive as bytes too.
    pub fn text(&self) -> Option<String> {
        String::from_utf8(self.bytes.clone()).ok()
    }
}

/// Drains a multipart body into named fields. Later parts with the same
/// name win.
pub async fn collect_fields(
    multipart: &mut Multipart,
) -> Result<HashMap<String, UploadField>, ApiError> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };
        let filename = field.file_name().map(ToString::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?
            .to_vec();
        fields.insert(name, UploadField { filename, bytes });
    }
    Ok(fields)
}

pub async fn serve_asset(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<String>,
) -> impl IntoResponse {
    let (reader, size) = state.media.open(&asset_id).await.map_err(|e| match e {
        MediaStorageError::NotFound => ApiError::not_found("Asset not found"),
        MediaStorageError::InvalidAssetId => ApiError::bad_request("Invalid asset id"),
        MediaStorageError::Io(e) => ApiError::internal("Failed to read asset").with_detail(e.to_string()),
    })?;

    let body = Body::from_stream(ReaderStream::new(reader));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .body(body)
        .map_err(|e| ApiError::internal("Failed to build response").with_detail(e.to_string()))?;

    Ok::<_, ApiError>(response)
}
