use std::env;

use thiserror::Error;

use crate::guard::AllowList;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared read-only through `AppState` (pulled into handlers via `FromRef`).
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the log format.
    pub env: Env,
    // Base URL of the Supabase project (e.g. https://xyz.supabase.co).
    pub supabase_url: String,
    // Public (anon) API key, sent as `apikey` on every Supabase call.
    pub supabase_key: String,
    // Privileged service-role key. Only used server-side to sign storage URLs.
    pub service_role_key: String,
    // HS256 secret for local session verification. When absent, sessions are
    // verified remotely against the Auth API.
    pub jwt_secret: Option<String>,
    // Expected `aud` claim of Supabase access tokens.
    pub jwt_audience: String,
    // Direct Postgres connection. When present the store bypasses PostgREST.
    pub database_url: Option<String>,
    pub bind_addr: String,
    // Directory of pre-built pages served behind the navigation guard.
    pub public_dir: String,
    pub login_path: String,
    pub allow_list: AllowList,
    pub storage_buckets: Vec<StorageBucket>,
}

/// Env
///
/// Defines the runtime context. Local gets human-readable logs, Production gets JSON.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// A storage bucket the storage URL endpoint may resolve objects in.
#[derive(Clone, PartialEq, Debug)]
pub struct StorageBucket {
    pub name: String,
    pub public: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Default for AppConfig {
    /// Safe, non-panicking values for test state scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            supabase_url: "http://localhost:54321".to_string(),
            supabase_key: "test-anon-key".to_string(),
            service_role_key: "test-service-role-key".to_string(),
            jwt_secret: Some("super-secure-test-secret-value-local".to_string()),
            jwt_audience: "authenticated".to_string(),
            database_url: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            public_dir: "public".to_string(),
            login_path: "/login".to_string(),
            allow_list: AllowList::LoginAndSignup,
            storage_buckets: vec![StorageBucket {
                name: "images".to_string(),
                public: true,
            }],
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the process environment. Fails fast when any of
    /// the three Supabase credentials is missing; the caller is expected to abort startup.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// from_lookup
    ///
    /// Builds the configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let env = match get("APP_ENV").as_deref() {
            Some("production") => Env::Production,
            _ => Env::Local,
        };

        let supabase_url = require("SUPABASE_URL")?.trim_end_matches('/').to_string();
        let supabase_key = require("SUPABASE_KEY")?;
        let service_role_key = require("SUPABASE_SERVICE_ROLE_KEY")?;

        let login_path = get("LOGIN_PATH").unwrap_or_else(|| "/login".to_string());
        if !login_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                name: "LOGIN_PATH",
                reason: format!("'{}' is not an absolute path", login_path),
            });
        }

        let allow_list = match get("GUARD_ALLOW_LIST") {
            Some(raw) => AllowList::parse(&raw).map_err(|reason| ConfigError::Invalid {
                name: "GUARD_ALLOW_LIST",
                reason,
            })?,
            None => AllowList::LoginAndSignup,
        };

        let storage_buckets = match get("STORAGE_BUCKETS") {
            Some(raw) => parse_buckets(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            env,
            supabase_url,
            supabase_key,
            service_role_key,
            jwt_secret: get("SUPABASE_JWT_SECRET"),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| "authenticated".to_string()),
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            public_dir: get("PUBLIC_DIR").unwrap_or_else(|| "public".to_string()),
            login_path,
            allow_list,
            storage_buckets,
        })
    }

    /// Looks up a configured bucket by exact name.
    pub fn bucket(&self, name: &str) -> Option<&StorageBucket> {
        self.storage_buckets.iter().find(|bucket| bucket.name == name)
    }
}

// Format: `avatars:public,reports:private`. A bare name is treated as public.
fn parse_buckets(raw: &str) -> Result<Vec<StorageBucket>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, visibility) = item.split_once(':').unwrap_or((item, "public"));
            let public = match visibility {
                "public" => true,
                "private" => false,
                other => {
                    return Err(ConfigError::Invalid {
                        name: "STORAGE_BUCKETS",
                        reason: format!("unknown visibility '{}' for bucket '{}'", other, name),
                    });
                }
            };
            Ok(StorageBucket {
                name: name.to_string(),
                public,
            })
        })
        .collect()
}
