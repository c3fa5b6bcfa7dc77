use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Application Schemas (Mapped to Database) ---

/// Entry
///
/// A guestbook record from the `public.entries` table. `id` and `created_at` are
/// always assigned by the store and never taken from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Entry {
    #[ts(optional)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    pub message: String,
    #[ts(optional)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Table
///
/// The closed set of tables the read endpoint may list. Resolved server-side from the
/// caller's free-text `table` field so no other store object is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Entries,
}

impl Table {
    pub const ALL: [Table; 1] = [Table::Entries];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Entries => "entries",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| format!("Unknown table: {}", s))
    }
}

// --- Request Payloads (Input Schemas) ---

/// NewEntry
///
/// Input payload for the write endpoint. Any `id` or `created_at` sent by the client is
/// dropped during deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NewEntry {
    #[schema(example = "Ada")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "Hello from the guestbook")]
    pub message: String,
}

impl NewEntry {
    pub fn new(name: impl Into<String>, email: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            message: message.into(),
        }
    }
}

/// FetchDataRequest
///
/// Input payload for the read endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FetchDataRequest {
    #[schema(example = "entries")]
    pub table: String,
}

/// StorageUrlRequest
///
/// Input payload for resolving an object URL in a configured bucket.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StorageUrlRequest {
    #[schema(example = "images")]
    pub bucket: String,
    #[schema(example = "banner.png")]
    pub file_name: String,
}

// --- Response Schemas (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StorageUrlResponse {
    pub url: String,
    /// True when the URL is a short-lived signed URL rather than a permanent public one.
    pub signed: bool,
}

/// ErrorBody
///
/// The uniform failure body returned by every API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ErrorBody {
    pub status_code: u16,
    pub status_message: String,
}
