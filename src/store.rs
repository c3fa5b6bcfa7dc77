use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::{
    auth::AuthUser,
    models::{Entry, NewEntry, Table},
};

/// StoreError
///
/// A failure reported by (or while talking to) the external data store.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// The store answered and refused the operation.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// The store could not be reached.
    #[error("{0}")]
    Transport(String),
    /// The store answered with rows we could not read.
    #[error("{0}")]
    Decode(String),
}

impl StoreError {
    pub fn message(&self) -> &str {
        match self {
            StoreError::Rejected { message, .. } => message,
            StoreError::Transport(message) | StoreError::Decode(message) => message,
        }
    }
}

/// Store Trait
///
/// The data-access capability handed to every endpoint. Implementations perform exactly
/// one round trip per call and never retry.
#[async_trait]
pub trait Store: Send + Sync {
    /// Every row of `table`, newest first (`created_at` descending). An empty table is `Ok(vec![])`.
    async fn select(&self, session: &AuthUser, table: Table) -> Result<Vec<Entry>, StoreError>;

    /// Inserts `rows` and returns them as stored, with `id` and `created_at` assigned.
    async fn insert(
        &self,
        session: &AuthUser,
        table: Table,
        rows: Vec<NewEntry>,
    ) -> Result<Vec<Entry>, StoreError>;
}

/// StoreState
///
/// The concrete type used to share the store across the application state.
pub type StoreState = Arc<dyn Store>;

// --- PostgREST (Supabase Data API) ---

#[derive(Deserialize)]
struct PostgrestError {
    #[serde(default)]
    message: String,
}

/// RestStore
///
/// Talks to the Supabase Data API (PostgREST) at `{SUPABASE_URL}/rest/v1`. Requests carry
/// the caller's own access token so row-level security applies as that user.
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(supabase_url: &str, api_key: &str) -> Self {
        Self::with_client(reqwest::Client::new(), supabase_url, api_key)
    }

    pub fn with_client(client: reqwest::Client, supabase_url: &str, api_key: &str) -> Self {
        Self {
            client,
            rest_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn request(&self, method: reqwest::Method, url: String, session: &AuthUser) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", session.access_token))
            .header(ACCEPT, "application/json")
    }
}

async fn read_rows(response: reqwest::Response) -> Result<Vec<Entry>, StoreError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Vec<Entry>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<PostgrestError>(&body) {
        Ok(err) => err.message,
        Err(_) => body,
    };
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Store for RestStore {
    async fn select(&self, session: &AuthUser, table: Table) -> Result<Vec<Entry>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, self.table_url(table), session)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        read_rows(response).await
    }

    async fn insert(
        &self,
        session: &AuthUser,
        table: Table,
        rows: Vec<NewEntry>,
    ) -> Result<Vec<Entry>, StoreError> {
        let response = self
            .request(reqwest::Method::POST, self.table_url(table), session)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        read_rows(response).await
    }
}

// --- Direct Postgres ---

/// PostgresStore
///
/// Connects straight to the project's Postgres instance. Used when `DATABASE_URL` is set;
/// row-level security does not apply on this path.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    if matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    ) {
        return StoreError::Transport(e.to_string());
    }
    let message = match &e {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    };
    StoreError::Rejected {
        status: 500,
        message,
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn select(&self, session: &AuthUser, table: Table) -> Result<Vec<Entry>, StoreError> {
        tracing::debug!(user = %session.id, %table, "select via postgres");
        let sql = match table {
            Table::Entries => {
                "SELECT id, name, email, message, created_at FROM entries ORDER BY created_at DESC"
            }
        };
        sqlx::query_as::<_, Entry>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn insert(
        &self,
        session: &AuthUser,
        table: Table,
        rows: Vec<NewEntry>,
    ) -> Result<Vec<Entry>, StoreError> {
        tracing::debug!(user = %session.id, %table, count = rows.len(), "insert via postgres");
        let sql = match table {
            Table::Entries => {
                "INSERT INTO entries (name, email, message) VALUES ($1, $2, $3) \
                 RETURNING id, name, email, message, created_at"
            }
        };

        // All rows land or none do.
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = sqlx::query_as::<_, Entry>(sql)
                .bind(row.name)
                .bind(row.email)
                .bind(row.message)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;
            inserted.push(entry);
        }
        tx.commit().await.map_err(db_error)?;

        Ok(inserted)
    }
}

// --- In-Memory (Tests and offline runs) ---

/// MemoryStore
///
/// An in-process stand-in for the hosted store. Assigns ids and timestamps the way the
/// real store does, counts calls so tests can assert the store was never reached, and
/// can be told to fail with a given message.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Entry>>,
    failure: Mutex<Option<String>>,
    selects: AtomicUsize,
    inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Entry>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Every subsequent call fails with `message` until `recover` is called.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn select_calls(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<Entry> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            Some(message) => Err(StoreError::Rejected {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, _session: &AuthUser, table: Table) -> Result<Vec<Entry>, StoreError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut rows = match table {
            Table::Entries => self.rows(),
        };
        // Ties on created_at fall back to insertion order, newest first.
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn insert(
        &self,
        _session: &AuthUser,
        table: Table,
        rows: Vec<NewEntry>,
    ) -> Result<Vec<Entry>, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut stored = match table {
            Table::Entries => self.rows.lock().unwrap_or_else(PoisonError::into_inner),
        };
        let mut next_id = stored.iter().filter_map(|row| row.id).max().unwrap_or(0);

        let inserted: Vec<Entry> = rows
            .into_iter()
            .map(|row| {
                next_id += 1;
                Entry {
                    id: Some(next_id),
                    name: row.name,
                    email: row.email,
                    message: row.message,
                    created_at: Some(Utc::now()),
                }
            })
            .collect();

        stored.extend(inserted.iter().cloned());
        Ok(inserted)
    }
}
