//! API handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::models::DocumentStatus;
use crate::pipeline::{DispatchError, ReviewAnnotation};
use crate::storage;

type ApiResult = Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)>;

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    tracing::error!("request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{what} not found") })),
    )
}

/// `POST /api/documents` - register an upload.
///
/// Returns the new document id and the pre-authorized write location for
/// the raw bytes.
pub async fn request_upload(State(state): State<AppState>) -> ApiResult {
    let doc = state.processing.create_document().map_err(internal_error)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "document_id": doc.id,
            "upload_location": format!("/api/documents/{}/content", doc.id),
        })),
    ))
}

/// `PUT /api/documents/:doc_id/content` - deliver the uploaded bytes.
///
/// Content is stored content-addressed; the document record keeps the key,
/// never the bytes.
pub async fn upload_content(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let doc = state.repo.get(&doc_id).map_err(internal_error)?;
    let Some(doc) = doc else {
        return Err(not_found("document"));
    };
    if doc.status != DocumentStatus::Queued {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "document is no longer accepting content" })),
        ));
    }

    let key = storage::content_key(&body, "bin");
    state
        .store
        .put_object(&key, &body)
        .await
        .map_err(internal_error)?;
    state
        .processing
        .attach_source(&doc_id, &key)
        .await
        .map_err(internal_error)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "document_id": doc_id,
            "source_key": key,
            "size": body.len(),
        })),
    ))
}

/// `GET /api/documents` - id/status/updated-at listing.
pub async fn list_documents(State(state): State<AppState>) -> ApiResult {
    let summaries = state.repo.list_summaries().map_err(internal_error)?;
    Ok((StatusCode::OK, Json(json!({ "documents": summaries }))))
}

/// `GET /api/documents/:doc_id` - full document record.
pub async fn get_document(State(state): State<AppState>, Path(doc_id): Path<String>) -> ApiResult {
    match state.repo.get(&doc_id).map_err(internal_error)? {
        Some(doc) => Ok((
            StatusCode::OK,
            Json(serde_json::to_value(&doc).map_err(internal_error)?),
        )),
        None => Err(not_found("document")),
    }
}

/// `POST /api/documents/:doc_id/process` - run the pipeline for one
/// document.
pub async fn process_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> ApiResult {
    if state.repo.get(&doc_id).map_err(internal_error)?.is_none() {
        return Err(not_found("document"));
    }
    let status = state
        .processing
        .process_document(&doc_id)
        .await
        .map_err(internal_error)?;
    Ok((
        StatusCode::OK,
        Json(json!({ "document_id": doc_id, "status": status })),
    ))
}

/// `POST /api/documents/:doc_id/cancel` - request cancellation.
pub async fn cancel_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> ApiResult {
    if state.repo.get(&doc_id).map_err(internal_error)?.is_none() {
        return Err(not_found("document"));
    }
    let status = state
        .processing
        .cancel(&doc_id)
        .await
        .map_err(internal_error)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "document_id": doc_id, "status": status })),
    ))
}

/// `GET /api/reviews` - pending review tasks.
pub async fn list_pending_reviews(State(state): State<AppState>) -> ApiResult {
    let tasks = state.dispatcher.list_pending().map_err(internal_error)?;
    Ok((StatusCode::OK, Json(json!({ "reviews": tasks }))))
}

/// `POST /api/reviews/:task_id/complete` - human-review completion
/// callback.
///
/// A duplicate or stale callback is answered with 409 rather than being
/// silently dropped.
pub async fn complete_review(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(annotations): Json<Vec<ReviewAnnotation>>,
) -> ApiResult {
    match state.processing.complete_review(&task_id, annotations).await {
        Ok(status) => Ok((
            StatusCode::OK,
            Json(json!({ "task_id": task_id, "document_status": status })),
        )),
        Err(e) => match e.downcast_ref::<DispatchError>() {
            Some(DispatchError::UnknownTask(_)) => Err((
                StatusCode::CONFLICT,
                Json(json!({ "error": "unknown or already resolved review task" })),
            )),
            _ => Err(internal_error(e)),
        },
    }
}

/// `GET /api/status` - document counts per lifecycle state.
pub async fn api_status(State(state): State<AppState>) -> ApiResult {
    let counts = state.repo.count_by_status().map_err(internal_error)?;
    let mut by_status = serde_json::Map::new();
    for (status, count) in counts {
        by_status.insert(status.as_str().to_string(), json!(count));
    }
    Ok((StatusCode::OK, Json(json!({ "documents": by_status }))))
}
