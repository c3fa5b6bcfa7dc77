#![allow(dead_code)]

use guestbook_portal::{
    AppConfig, AppState, MemoryStore, MockStorageService,
    auth::{AuthUser, Claims, JwtSessionVerifier},
    config::StorageBucket,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
pub const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Signs a Supabase-shaped access token. `exp_offset` may be negative for expired tokens.
pub fn create_token_with(secret: &str, user_id: Uuid, exp_offset: i64, aud: &str) -> String {
    let now = now();
    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now as i64 + exp_offset) as usize,
        aud: Some(aud.to_string()),
        email: Some("tester@example.com".to_string()),
        role: Some("authenticated".to_string()),
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

pub fn create_token(user_id: Uuid, exp_offset: i64) -> String {
    create_token_with(TEST_JWT_SECRET, user_id, exp_offset, "authenticated")
}

pub fn valid_token() -> String {
    create_token(TEST_USER_ID, 3600)
}

pub fn test_user() -> AuthUser {
    AuthUser {
        id: TEST_USER_ID,
        email: Some("tester@example.com".to_string()),
        access_token: valid_token(),
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.jwt_secret = Some(TEST_JWT_SECRET.to_string());
    config.storage_buckets = vec![
        StorageBucket { name: "images".to_string(), public: true },
        StorageBucket { name: "reports".to_string(), public: false },
    ];
    config
}

/// AppState wired with in-memory fakes and local JWT verification.
pub fn create_test_state(store: Arc<MemoryStore>, storage: MockStorageService) -> AppState {
    let config = test_config();
    let verifier = Arc::new(JwtSessionVerifier::new(TEST_JWT_SECRET, &config.jwt_audience));
    AppState::new(config, store, verifier.clone(), verifier, Arc::new(storage))
}
