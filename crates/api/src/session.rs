//! Bearer-token session shared by every API client clone.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub username: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: None,
            expires_at: None,
        }
    }

    /// Credentials returned by a login, expiring `expires_in` seconds after `now`
    pub fn issued(
        token: impl Into<String>,
        username: impl Into<String>,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            username: Some(username.into()),
            expires_at: Some(now + Duration::seconds(expires_in)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<RwLock<Option<Credentials>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(Credentials::from_token(token)))),
        }
    }

    pub async fn set(&self, credentials: Credentials) {
        *self.inner.write().await = Some(credentials);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.inner.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|c| c.token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// True when the token has a known expiry that has passed. A session
    /// without a token is not "expired", just empty.
    pub async fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.inner
            .read()
            .await
            .as_ref()
            .and_then(|c| c.expires_at)
            .is_some_and(|expires_at| expires_at <= now)
    }
}
