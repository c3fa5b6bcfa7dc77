use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, dangerous, decode, errors::ErrorKind, get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Cookie the Supabase browser client stores the access token in.
pub const SESSION_COOKIE: &str = "sb-access-token";

/// Claims
///
/// The subset of a Supabase access token's payload this service reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the `auth.users.id` of the session owner.
    pub sub: Uuid,
    /// Expiration Time (exp): tokens past this instant are rejected.
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// AuthUser
///
/// The identity reference for a present session. Handlers never inspect it beyond
/// forwarding it to the store, which needs the token for row-level security.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
}

/// bearer_token
///
/// Finds the caller's access token: `Authorization: Bearer ...` first, then the
/// session cookie set by the browser client.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|token| !token.is_empty())
}

// --- Server-side verification ---

/// SessionVerifier
///
/// Server-side answer to "does this token belong to a live session". Absence is a
/// normal outcome, never an error.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify_session(&self, token: &str) -> Option<AuthUser>;
}

pub type SessionState = Arc<dyn SessionVerifier>;

/// SessionLookup
///
/// The synchronous, network-free session check used by the navigation guard.
pub trait SessionLookup: Send + Sync {
    fn current_session(&self, headers: &HeaderMap) -> bool;
}

pub type LookupState = Arc<dyn SessionLookup>;

/// JwtSessionVerifier
///
/// Verifies Supabase access tokens locally with the project's HS256 JWT secret.
#[derive(Clone)]
pub struct JwtSessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSessionVerifier {
    pub fn new(secret: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[audience]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn decode(&self, token: &str) -> Option<AuthUser> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(AuthUser {
                id: data.claims.sub,
                email: data.claims.email,
                access_token: token.to_string(),
            }),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
                    other => tracing::debug!("session token rejected: {:?}", other),
                }
                None
            }
        }
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify_session(&self, token: &str) -> Option<AuthUser> {
        self.decode(token)
    }
}

impl SessionLookup for JwtSessionVerifier {
    fn current_session(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers)
            .and_then(|token| self.decode(&token))
            .is_some()
    }
}

/// CachedSessionLookup
///
/// Reads the cached token's expiry without checking its signature, the same
/// information the browser client has. Only suitable for the navigation guard.
#[derive(Clone, Debug, Default)]
pub struct CachedSessionLookup;

impl SessionLookup for CachedSessionLookup {
    fn current_session(&self, headers: &HeaderMap) -> bool {
        let Some(token) = bearer_token(headers) else {
            return false;
        };
        match dangerous::insecure_decode::<Claims>(token.as_str()) {
            Ok(data) => (data.claims.exp as u64) > get_current_timestamp(),
            Err(e) => {
                tracing::debug!("cached session token unreadable: {:?}", e.kind());
                false
            }
        }
    }
}

#[derive(Deserialize)]
struct SupabaseUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// SupabaseAuthVerifier
///
/// Asks the Supabase Auth API (`GET /auth/v1/user`) whether the token is live. Used when
/// no JWT secret is configured.
#[derive(Clone)]
pub struct SupabaseAuthVerifier {
    client: reqwest::Client,
    user_url: String,
    api_key: String,
}

impl SupabaseAuthVerifier {
    pub fn new(supabase_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_url: format!("{}/auth/v1/user", supabase_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SessionVerifier for SupabaseAuthVerifier {
    async fn verify_session(&self, token: &str) -> Option<AuthUser> {
        let response = match self
            .client
            .get(&self.user_url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // An unreachable auth service is reported as an absent session.
                tracing::warn!("auth service unreachable: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!("auth service rejected token: {}", response.status());
            return None;
        }

        match response.json::<SupabaseUser>().await {
            Ok(user) => Some(AuthUser {
                id: user.id,
                email: user.email,
                access_token: token.to_string(),
            }),
            Err(e) => {
                tracing::warn!("auth service returned an unreadable user: {}", e);
                None
            }
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Resolves the session before any other extractor reads the body. Handlers that list
/// `AuthUser` first are therefore never reached, and never touch the store, without a
/// live session.
///
/// Rejection: `ApiError::Unauthorized` (401).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionState::from_ref(state);

        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;

        match sessions.verify_session(&token).await {
            Some(user) => Ok(user),
            None => {
                tracing::info!(uri = %parts.uri, "request without a live session");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
