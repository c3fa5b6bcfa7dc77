use axum::{Json, extract::State, extract::rejection::JsonRejection};

use crate::{
    auth::AuthUser,
    config::AppConfig,
    error::ApiError,
    models::{
        Entry, ErrorBody, FetchDataRequest, NewEntry, StorageUrlRequest, StorageUrlResponse, Table,
    },
    storage::StorageState,
    store::StoreState,
};

pub const FETCH_FALLBACK_MESSAGE: &str = "Failed to fetch data from database";
pub const INSERT_FALLBACK_MESSAGE: &str = "Failed to insert entry";

// --- Handlers ---
//
// Every handler takes `AuthUser` as its first extractor, so the session is resolved
// before the body is read and before any store call.

/// fetch_data
///
/// [Authenticated Route] Lists every row of the requested table, newest first.
/// The table name is resolved against the closed `Table` set before the store is called.
#[utoipa::path(
    post,
    path = "/api/fetchData",
    request_body = FetchDataRequest,
    responses(
        (status = 200, description = "Rows, newest first", body = [Entry]),
        (status = 400, description = "Unknown table or malformed body", body = ErrorBody),
        (status = 401, description = "No live session", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn fetch_data(
    user: AuthUser,
    State(store): State<StoreState>,
    payload: Result<Json<FetchDataRequest>, JsonRejection>,
) -> Result<Json<Vec<Entry>>, ApiError> {
    let Json(request) = payload?;
    let table: Table = request.table.parse().map_err(ApiError::BadRequest)?;

    let rows = store.select(&user, table).await.map_err(|e| {
        tracing::error!(%table, "select failed: {}", e);
        ApiError::store(e, FETCH_FALLBACK_MESSAGE)
    })?;

    tracing::debug!(%table, count = rows.len(), "rows fetched");
    Ok(Json(rows))
}

/// post_data
///
/// [Authenticated Route] Inserts one guestbook entry. `id` and `created_at` come from
/// the store. No idempotency key is used: a retried request creates a second row.
#[utoipa::path(
    post,
    path = "/api/postData",
    request_body = NewEntry,
    responses(
        (status = 200, description = "Inserted row(s)", body = [Entry]),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 401, description = "No live session", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn post_data(
    user: AuthUser,
    State(store): State<StoreState>,
    payload: Result<Json<NewEntry>, JsonRejection>,
) -> Result<Json<Vec<Entry>>, ApiError> {
    let Json(entry) = payload?;

    let inserted = store
        .insert(&user, Table::Entries, vec![entry])
        .await
        .map_err(|e| {
            tracing::error!("insert failed: {}", e);
            ApiError::store(e, INSERT_FALLBACK_MESSAGE)
        })?;

    tracing::info!(user = %user.id, count = inserted.len(), "entry inserted");
    Ok(Json(inserted))
}

/// storage_url
///
/// [Authenticated Route] Resolves a browser-fetchable URL for an object in one of the
/// configured buckets. Public buckets yield their public URL, private ones a signed URL.
#[utoipa::path(
    post,
    path = "/api/storageUrl",
    request_body = StorageUrlRequest,
    responses(
        (status = 200, description = "Object URL", body = StorageUrlResponse),
        (status = 400, description = "Unknown bucket or bad file name", body = ErrorBody),
        (status = 401, description = "No live session", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
pub async fn storage_url(
    _user: AuthUser,
    State(config): State<AppConfig>,
    State(storage): State<StorageState>,
    payload: Result<Json<StorageUrlRequest>, JsonRejection>,
) -> Result<Json<StorageUrlResponse>, ApiError> {
    let Json(request) = payload?;

    let bucket = config
        .bucket(&request.bucket)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown bucket: {}", request.bucket)))?;

    let url = storage.object_url(bucket, &request.file_name).await?;

    Ok(Json(StorageUrlResponse {
        url,
        signed: !bucket.public,
    }))
}
