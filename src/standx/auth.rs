//! Authentication seams for the StandX gateway
//!
//! The venue wants a bearer token on private endpoints and a request
//! signature on order mutations. Both are injected so the gateway never
//! holds key material itself.

use async_trait::async_trait;

use crate::grid::{GridError, GridResult};

/// Obtains a bearer access token
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self) -> GridResult<String>;
}

/// Signs the `"v1,{request_id},{timestamp},{body}"` payload of a mutating request
pub trait RequestSigner: Send + Sync {
    fn sign(&self, payload: &str) -> GridResult<String>;
}

/// A pre-issued access token, handed out on every login
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn login(&self) -> GridResult<String> {
        if self.token.trim().is_empty() {
            return Err(GridError::Auth("no access token configured".into()));
        }
        Ok(self.token.clone())
    }
}

/// Payload covered by the request signature
pub fn signing_payload(version: &str, request_id: &str, timestamp_ms: i64, body: &str) -> String {
    format!("{},{},{},{}", version, request_id, timestamp_ms, body)
}
