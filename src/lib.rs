use axum::{Router, extract::FromRef, http::HeaderName};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod storage;
pub mod store;

pub mod routes;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use auth::{LookupState, SessionState};
pub use config::AppConfig;
pub use error::ApiError;
pub use guard::GuardPolicy;
pub use storage::{MockStorageService, StorageState, SupabaseStorageClient};
pub use store::{MemoryStore, PostgresStore, RestStore, StoreState};

/// ApiDoc
///
/// OpenAPI document for the data endpoints, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::fetch_data, handlers::post_data, handlers::storage_url),
    components(
        schemas(
            models::Entry, models::NewEntry, models::FetchDataRequest,
            models::StorageUrlRequest, models::StorageUrlResponse, models::ErrorBody,
        )
    ),
    tags(
        (name = "guestbook", description = "Guestbook entries backed by Supabase")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Every capability a request may use, passed explicitly. Handlers pull only what
/// they need through `FromRef`, which keeps them testable with fakes.
#[derive(Clone)]
pub struct AppState {
    /// Data store (PostgREST, direct Postgres, or in-memory).
    pub store: StoreState,
    /// Server-side session verification for API calls.
    pub sessions: SessionState,
    /// Network-free session lookup for the navigation guard.
    pub session_lookup: LookupState,
    /// Object URL resolution for storage buckets.
    pub storage: StorageState,
    /// Public paths and login redirect target for page navigations.
    pub guard: Arc<GuardPolicy>,
    pub config: AppConfig,
}

impl AppState {
    /// Builds the state, resolving the guard policy from the config's allow-list.
    pub fn new(
        config: AppConfig,
        store: StoreState,
        sessions: SessionState,
        session_lookup: LookupState,
        storage: StorageState,
    ) -> Self {
        let guard = Arc::new(GuardPolicy::new(config.login_path.clone(), &config.allow_list));
        Self {
            store,
            sessions,
            session_lookup,
            storage,
            guard,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for StoreState {
    fn from_ref(app_state: &AppState) -> StoreState {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routes, the page surface behind the navigation guard, and the
/// observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // API routes carry no route layer: each handler resolves the session itself.
        .merge(authenticated::authenticated_routes())
        // Anything else is a page, served behind the navigation guard.
        .fallback_service(public::page_routes(state.clone()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` assigned above, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
