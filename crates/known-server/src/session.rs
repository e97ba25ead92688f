use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use nanoid::nanoid;
use serde::Serialize;

/// Session token length, matching the issuing side of the auth provider.
const TOKEN_LEN: usize = 32;

const SESSION_COOKIE: &str = "known_session";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUser {
    pub id: String,
}

/// The opaque session object handed to page handlers. Issuance belongs to
/// the external auth provider; this side only resolves tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user: SessionUser,
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session_for(&self, token: &str) -> Option<Session>;
}

/// Token map for development and tests. Real deployments resolve tokens
/// against the auth provider instead.
pub struct MemorySessions {
    tokens: DashMap<String, Session>,
}

impl MemorySessions {
    pub fn new() -> Self {
        MemorySessions {
            tokens: DashMap::new(),
        }
    }

    /// Mint a token for a user id and register its session.
    pub fn issue(&self, user_id: &str) -> String {
        let token = nanoid!(TOKEN_LEN);
        self.tokens.insert(
            token.clone(),
            Session {
                user: SessionUser {
                    id: user_id.to_string(),
                },
            },
        );
        token
    }
}

impl Default for MemorySessions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for MemorySessions {
    async fn session_for(&self, token: &str) -> Option<Session> {
        self.tokens.get(token).map(|s| s.clone())
    }
}

/// Pull the session token from `Authorization: Bearer ...` or the session
/// cookie. Returns `None` when neither is present.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}
