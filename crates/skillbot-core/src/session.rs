use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::domain::ScopeSnapshot;

/// Typed connect-time failures raised at the platform boundary.
///
/// The adapter maps its client library's errors into this taxonomy so the
/// supervisor can pick a retry policy by kind instead of inspecting text.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConnectError {
    /// The platform rejected the attempt with a rate limit. The suggested
    /// delay is logged, but the supervisor applies its own backoff formula.
    #[error("rate limited by the platform")]
    RateLimited { retry_after: Option<Duration> },

    /// The token was rejected. Retryable only after fresh credential
    /// acquisition.
    #[error("authentication rejected")]
    AuthFailed,

    /// Transient network trouble; retryable with backoff.
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// Everything else. Terminates the supervisor immediately.
    #[error("fatal transport error: {0}")]
    Fatal(String),
}

/// Why a live session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    Errored(String),
}

/// Connection factory. One fresh wire connection per call; attempts are never
/// concurrent.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Resolves once the platform has confirmed readiness.
    async fn connect(&self, token: &str) -> Result<Arc<dyn Session>, ConnectError>;
}

/// A live connection to the messaging platform.
///
/// Shared by reference with the background task runner and the command
/// surface; only the supervisor opens and closes it.
#[async_trait]
pub trait Session: Send + Sync {
    /// Resolves when the session ends. Calling again after resolution yields
    /// the same reason.
    async fn wait_disconnected(&self) -> DisconnectReason;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self);

    async fn update_presence(&self, text: &str) -> crate::Result<()>;

    /// Guilds currently visible to this session.
    async fn scope(&self) -> ScopeSnapshot;
}
