use guestbook_portal::{
    AppState, LookupState, SessionState, create_router,
    auth::{CachedSessionLookup, JwtSessionVerifier, SupabaseAuthVerifier},
    config::{AppConfig, Env},
    storage::{StorageState, SupabaseStorageClient},
    store::{PostgresStore, RestStore, StoreState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, wires the Supabase clients into the shared
/// state and serves HTTP.
#[tokio::main]
async fn main() {
    // 1. Configuration (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load().unwrap_or_else(|e| panic!("FATAL: {}", e));

    // 2. Logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "guestbook_portal=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Store: direct Postgres when DATABASE_URL is set, the Data API otherwise.
    let store: StoreState = match &config.database_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            tracing::info!("Using direct Postgres store");
            Arc::new(PostgresStore::new(pool))
        }
        None => {
            tracing::info!("Using Supabase Data API store at {}", config.supabase_url);
            Arc::new(RestStore::new(&config.supabase_url, &config.supabase_key))
        }
    };

    // 4. Sessions: local JWT verification when the secret is known, Auth API otherwise.
    let (sessions, session_lookup): (SessionState, LookupState) = match &config.jwt_secret {
        Some(secret) => {
            let verifier = Arc::new(JwtSessionVerifier::new(secret, &config.jwt_audience));
            let sessions: SessionState = verifier.clone();
            let lookup: LookupState = verifier;
            (sessions, lookup)
        }
        None => {
            tracing::warn!("SUPABASE_JWT_SECRET not set; verifying sessions via the Auth API");
            let sessions: SessionState = Arc::new(SupabaseAuthVerifier::new(
                &config.supabase_url,
                &config.supabase_key,
            ));
            let lookup: LookupState = Arc::new(CachedSessionLookup::default());
            (sessions, lookup)
        }
    };

    // 5. Storage
    let storage: StorageState = Arc::new(SupabaseStorageClient::new(
        &config.supabase_url,
        &config.service_role_key,
    ));

    // 6. Router and Server Startup
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(config, store, sessions, session_lookup, storage));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: cannot bind {}: {}", bind_addr, e));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}
