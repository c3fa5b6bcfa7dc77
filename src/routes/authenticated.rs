use crate::{AppState, handlers};
use axum::{Router, routing::any};

/// Authenticated Router Module
///
/// The data endpoints. They accept any method, matching the clients that call them
/// with a JSON body regardless of verb. Each handler re-verifies the session through
/// the `AuthUser` extractor, independent of the navigation guard.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // /api/fetchData  { table }
        // Lists a table's rows, newest first.
        .route("/api/fetchData", any(handlers::fetch_data))
        // /api/postData  { name, email, message }
        // Inserts one guestbook entry.
        .route("/api/postData", any(handlers::post_data))
        // /api/storageUrl  { bucket, fileName }
        // Resolves a public or signed URL for a stored object.
        .route("/api/storageUrl", any(handlers::storage_url))
}
