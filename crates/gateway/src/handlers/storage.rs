use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use md5::{Digest, Md5};
use rise_protocol::{generate_document_id, BeginUpload, ObjectRef, ResolvedUrl, UploadSession};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::blobs::{encode_key, sanitize_key};
use crate::error::{ApiError, ApiResult};
use crate::handlers::auth::AuthUser;
use crate::AppState;

/// Server-side state of one resumable upload.
pub struct UploadState {
    pub owner_id: String,
    pub path: String,
    pub total_bytes: u64,
    pub bytes_received: u64,
    hasher: Md5,
}

pub type UploadSlot = Arc<Mutex<UploadState>>;

impl UploadState {
    fn session(&self, upload_id: &str) -> UploadSession {
        UploadSession {
            upload_id: upload_id.to_string(),
            path: self.path.clone(),
            total_bytes: self.total_bytes,
            bytes_received: self.bytes_received,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    pub offset: u64,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub path: String,
}

async fn owned_slot(state: &AppState, upload_id: &str, user: &AuthUser) -> ApiResult<UploadSlot> {
    let missing = || ApiError::NotFound(format!("Upload {upload_id} not found or expired"));
    let slot = state.uploads.get(upload_id).await.ok_or_else(missing)?;
    if slot.lock().await.owner_id != user.id {
        return Err(missing());
    }
    Ok(slot)
}

pub async fn begin_upload(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<BeginUpload>,
) -> ApiResult<impl IntoResponse> {
    let path = sanitize_key(&request.path)?;
    if request.total_bytes > state.config.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Upload of {} bytes exceeds the {} byte limit",
            request.total_bytes, state.config.max_upload_bytes
        )));
    }

    let upload_id = generate_document_id();
    state.blobs.create_staging(&upload_id).await?;
    let upload = UploadState {
        owner_id: user.id.clone(),
        path,
        total_bytes: request.total_bytes,
        bytes_received: 0,
        hasher: Md5::new(),
    };
    let session = upload.session(&upload_id);
    state
        .uploads
        .insert(upload_id.clone(), Arc::new(Mutex::new(upload)))
        .await;

    tracing::info!(
        "{} began upload {} -> {} ({} bytes)",
        user.email, upload_id, session.path, session.total_bytes
    );
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn upload_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadSession>> {
    let slot = owned_slot(&state, &upload_id, &user).await?;
    let upload = slot.lock().await;
    Ok(Json(upload.session(&upload_id)))
}

/// Appends one chunk. `offset` must equal the bytes already acknowledged so a
/// client resuming after a failure cannot write a gap or an overlap.
pub async fn put_chunk(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(upload_id): Path<String>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> ApiResult<Json<UploadSession>> {
    let slot = owned_slot(&state, &upload_id, &user).await?;
    let mut upload = slot.lock().await;

    if query.offset != upload.bytes_received {
        return Err(ApiError::Conflict(format!(
            "Expected offset {}, got {}",
            upload.bytes_received, query.offset
        )));
    }
    let received = upload.bytes_received + body.len() as u64;
    if received > upload.total_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Chunk ends at {received}, past the declared {} bytes",
            upload.total_bytes
        )));
    }

    state.blobs.append(&upload_id, &body).await?;
    upload.hasher.update(&body);
    upload.bytes_received = received;
    tracing::debug!("Upload {}: {}/{} bytes", upload_id, received, upload.total_bytes);
    Ok(Json(upload.session(&upload_id)))
}

pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<ObjectRef>> {
    let slot = owned_slot(&state, &upload_id, &user).await?;
    let upload = slot.lock().await;
    if upload.bytes_received != upload.total_bytes {
        return Err(ApiError::BadRequest(format!(
            "Upload incomplete: {} of {} bytes received",
            upload.bytes_received, upload.total_bytes
        )));
    }

    let etag = hex::encode(upload.hasher.clone().finalize());

    // The row only commits once the file is in place; any failure before that
    // leaves the staging file, so the client can call `complete` again.
    let mut tx = state.db.begin().await?;
    sqlx::query(
        "INSERT INTO objects (path, size, etag, owner_id) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (path) DO UPDATE SET size = EXCLUDED.size, etag = EXCLUDED.etag, \
         owner_id = EXCLUDED.owner_id, created_at = now()",
    )
    .bind(&upload.path)
    .bind(upload.total_bytes as i64)
    .bind(&etag)
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;
    state.blobs.commit(&upload_id, &upload.path).await?;
    if let Err(err) = tx.commit().await {
        if let Err(io_err) = state.blobs.restage(&upload_id, &upload.path).await {
            tracing::error!("Upload {} stranded at {}: {}", upload_id, upload.path, io_err);
        }
        return Err(err.into());
    }

    state.edge_cache.invalidate(&upload.path).await;
    state.uploads.invalidate(&upload_id).await;
    tracing::info!("Upload {} committed as {} (etag {})", upload_id, upload.path, etag);

    Ok(Json(ObjectRef {
        path: upload.path.clone(),
        size: upload.total_bytes,
        etag,
    }))
}

pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/storage/objects/{}", base, encode_key(key))
}

pub async fn resolve_url(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<Json<ResolvedUrl>> {
    let path = sanitize_key(&query.path)?;
    let exists: Option<(String,)> = sqlx::query_as("SELECT path FROM objects WHERE path = $1")
        .bind(&path)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound(format!("Object {path} not found")));
    }
    Ok(Json(ResolvedUrl {
        url: public_url(&state.config.public_base_url, &path),
    }))
}

/// Public download by key; recently served objects are kept in the edge cache.
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let key = sanitize_key(&key)?;
    let data = match state.edge_cache.get(&key).await {
        Some(cached) => {
            tracing::debug!("Edge cache hit: {}", key);
            cached
        }
        None => {
            let data = state
                .blobs
                .read(&key)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Object {key} not found")))?;
            state.edge_cache.insert(key.clone(), data.clone()).await;
            data
        }
    };

    let mime = mime_guess::from_path(&key).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.essence_str())
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_urls_point_at_download_route() {
        assert_eq!(
            public_url("http://localhost:9009", "audio/intro.mp3"),
            "http://localhost:9009/storage/objects/audio/intro.mp3"
        );
        assert_eq!(
            public_url("https://cdn.rise.dev", "videos/day one.mp4"),
            "https://cdn.rise.dev/storage/objects/videos/day%20one.mp4"
        );
    }
}
