/// File asset upload and download
///
/// # Endpoints
///
/// - `POST /v1/workspaces/:slug/file-assets`, `GET|DELETE /v1/workspaces/:slug/file-assets/:asset`
/// - `POST /v1/users/file-assets`, `GET|DELETE /v1/users/file-assets/:key`
///
/// Uploads are multipart with the file in `asset` and optional JSON in
/// `attributes`. Workspace asset paths carry only the part after the
/// `{workspace_id}/` prefix.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::{auth::CurrentUser, permission::ResolvedScope},
    routes::parse_json_field,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::{Bytes, BytesMut};
use plane_shared::models::file_asset::{user_asset_key, workspace_asset_key, FileAsset};
use plane_shared::storage::{check_size, StorageError};
use uuid::Uuid;

/// A parsed multipart upload
struct Upload {
    filename: String,
    data: Bytes,
    attributes: serde_json::Value,
}

/// Body-limit rejections surface as the same size error as an oversized field
fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return StorageError::TooLarge {
            size: limit + 1,
            limit,
        }
        .into();
    }
    ApiError::BadRequest(format!("Invalid multipart body: {}", err))
}

async fn read_upload(mut multipart: Multipart, limit: usize) -> ApiResult<Upload> {
    let mut file: Option<(String, Bytes)> = None;
    let mut raw_attributes: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("asset") => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
                    check_size(data.len() + chunk.len(), limit)?;
                    data.extend_from_slice(&chunk);
                }
                file = Some((filename, data.freeze()));
            }
            Some("attributes") => {
                raw_attributes = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::field("asset", "File is required"))?;
    let attributes = parse_json_field::<serde_json::Value>(raw_attributes.as_deref(), "attributes")?;
    let attributes = if attributes.is_null() {
        serde_json::json!({})
    } else {
        attributes
    };

    Ok(Upload {
        filename,
        data,
        attributes,
    })
}

/// Stores the bytes, then the row; a failed insert removes the bytes again
async fn store(
    state: &AppState,
    current: &CurrentUser,
    workspace_id: Option<Uuid>,
    key: String,
    upload: Upload,
) -> ApiResult<FileAsset> {
    let size = upload.data.len() as i64;
    state.storage.put(&key, upload.data).await?;

    match FileAsset::create(&state.db, &current.ctx, workspace_id, &key, upload.attributes, size)
        .await
    {
        Ok(asset) => {
            tracing::info!(asset = %asset.asset, size, "File asset uploaded");
            Ok(asset)
        }
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&key).await {
                tracing::warn!(asset = %key, error = %cleanup, "Failed to remove orphaned upload");
            }
            Err(e.into())
        }
    }
}

fn content_type(asset: &FileAsset) -> HeaderValue {
    asset
        .attributes
        .get("type")
        .and_then(|t| t.as_str())
        .and_then(|t| HeaderValue::from_str(t).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"))
}

async fn download(state: &AppState, asset: FileAsset) -> ApiResult<Response> {
    let data = state.storage.get(&asset.asset).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&asset))], data).into_response())
}

/// Removes the stored bytes, then the row
async fn remove(state: &AppState, asset: FileAsset) -> ApiResult<StatusCode> {
    if !state.storage.delete(&asset.asset).await? {
        tracing::warn!(asset = %asset.asset, "Asset bytes were already missing");
    }
    FileAsset::delete(&state.db, asset.id).await?;

    tracing::info!(asset = %asset.asset, "File asset deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn asset_not_found() -> ApiError {
    ApiError::NotFound("File does not exist".to_string())
}

/// Uploads a file into the workspace
///
/// ```text
/// POST /v1/workspaces/acme/file-assets
/// Content-Type: multipart/form-data
///   asset=<file>
///   attributes={"type": "image/png"}
/// ```
///
/// # Errors
///
/// - `400`: missing file, or "File size limit is 5MB"
pub async fn upload_workspace_asset(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<FileAsset>)> {
    let workspace_id = scope.workspace_id()?;
    let upload = read_upload(multipart, state.config.storage.max_upload_bytes).await?;
    let key = workspace_asset_key(workspace_id, &upload.filename);

    let asset = store(&state, &current, Some(workspace_id), key, upload).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn load_workspace_asset(
    state: &AppState,
    workspace_id: Uuid,
    asset: &str,
) -> ApiResult<FileAsset> {
    let key = format!("{}/{}", workspace_id, asset);
    FileAsset::find_by_key(&state.db, &key)
        .await?
        .filter(|a| a.workspace_id == Some(workspace_id))
        .ok_or_else(asset_not_found)
}

pub async fn get_workspace_asset(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, asset)): Path<(String, String)>,
) -> ApiResult<Response> {
    let asset = load_workspace_asset(&state, scope.workspace_id()?, &asset).await?;
    download(&state, asset).await
}

pub async fn delete_workspace_asset(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, asset)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let asset = load_workspace_asset(&state, scope.workspace_id()?, &asset).await?;
    remove(&state, asset).await
}

pub async fn upload_user_asset(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<FileAsset>)> {
    let upload = read_upload(multipart, state.config.storage.max_upload_bytes).await?;
    let key = user_asset_key(&upload.filename);

    let asset = store(&state, &current, None, key, upload).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

/// User assets are visible only to their uploader
async fn load_user_asset(state: &AppState, current: &CurrentUser, key: &str) -> ApiResult<FileAsset> {
    if !key.starts_with("user-") {
        return Err(asset_not_found());
    }
    FileAsset::find_by_key(&state.db, key)
        .await?
        .filter(|a| a.workspace_id.is_none() && a.created_by == Some(current.id()))
        .ok_or_else(asset_not_found)
}

pub async fn get_user_asset(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let asset = load_user_asset(&state, &current, &key).await?;
    download(&state, asset).await
}

pub async fn delete_user_asset(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    let asset = load_user_asset(&state, &current, &key).await?;
    remove(&state, asset).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MULTIPART_OVERHEAD;
    use axum::{
        body::{to_bytes, Body},
        extract::DefaultBodyLimit,
        http::Request,
        routing::post,
        Router,
    };
    use chrono::Utc;
    use plane_shared::storage::MAX_UPLOAD_BYTES;
    use tower::ServiceExt;

    const BOUNDARY: &str = "plane-test-boundary";

    async fn accept(multipart: Multipart) -> ApiResult<Json<serde_json::Value>> {
        let upload = read_upload(multipart, MAX_UPLOAD_BYTES).await?;
        Ok(Json(serde_json::json!({
            "filename": upload.filename,
            "size": upload.data.len(),
            "attributes": upload.attributes,
        })))
    }

    fn multipart_body(file_len: usize, attributes: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(attributes) = attributes {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"attributes\"\r\n\r\n{attributes}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"asset\"; filename=\"logo.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.resize(body.len() + file_len, b'x');
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    /// Same body limit the server applies to upload routes
    async fn upload(body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let app = Router::new()
            .route("/upload", post(accept))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD));

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upload_within_limit() {
        let (status, body) = upload(multipart_body(1024, Some(r#"{"type": "image/png"}"#))).await;

        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["filename"], "logo.png");
        assert_eq!(body["size"], 1024);
        assert_eq!(body["attributes"]["type"], "image/png");
    }

    #[tokio::test]
    async fn test_six_megabyte_upload_reports_size_limit() {
        let (status, body) = upload(multipart_body(6 * 1024 * 1024, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["message"], "File size limit is 5MB");
        assert_eq!(body["details"][0]["field"], "asset");
    }

    #[tokio::test]
    async fn test_just_over_limit_reports_size_limit() {
        let (status, body) = upload(multipart_body(MAX_UPLOAD_BYTES + 1, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "File size limit is 5MB");
    }

    #[tokio::test]
    async fn test_missing_asset_field() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"attributes\"\r\n\r\n{{}}\r\n--{BOUNDARY}--\r\n"
        );
        let (status, body) = upload(body.into_bytes()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "File is required");
    }

    fn asset_with(attributes: serde_json::Value) -> FileAsset {
        FileAsset {
            id: Uuid::new_v4(),
            asset: "user-abc-logo.png".to_string(),
            attributes,
            size: 10,
            workspace_id: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_content_type_from_attributes() {
        let asset = asset_with(serde_json::json!({ "type": "image/png" }));
        assert_eq!(content_type(&asset), "image/png");
    }

    #[test]
    fn test_content_type_fallback() {
        assert_eq!(
            content_type(&asset_with(serde_json::json!({}))),
            "application/octet-stream"
        );
        assert_eq!(
            content_type(&asset_with(serde_json::json!({ "type": "bad\nvalue" }))),
            "application/octet-stream"
        );
    }
}
