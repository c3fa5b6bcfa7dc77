use crate::{AppState, guard};
use axum::{Router, middleware, routing::get};
use tower_http::services::ServeDir;

/// Public Router Module
///
/// Endpoints reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers. Never touches Supabase.
        .route("/health", get(|| async { "ok" }))
}

/// page_routes
///
/// Serves the pre-built front-end from `public_dir`. Every page navigation passes the
/// navigation guard first; unauthenticated navigations outside the allow-list are
/// redirected to the login page before any page content is served.
pub fn page_routes(state: AppState) -> Router {
    let pages = ServeDir::new(&state.config.public_dir).append_index_html_on_directories(true);

    Router::new()
        .fallback_service(pages)
        .layer(middleware::from_fn_with_state(state, guard::navigation_guard))
}
