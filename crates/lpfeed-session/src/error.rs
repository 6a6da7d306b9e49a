//! Error taxonomy of the session layer.
//!
//! None of these ever leave a session: every variant is handled by the
//! backoff path and only shows up in logs.

use lpfeed_core::AccountId;
use thiserror::Error;

/// Failure of a single HTTP call to either endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    /// Credentials rejected. Retried like any other failure; account
    /// teardown is left to whoever owns the account lifecycle.
    #[error("auth failure {code}: {message}")]
    Auth { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no access token for account {0}")]
    MissingToken(AccountId),
}

/// Why a session entered backoff.
#[derive(Debug, Error)]
pub enum LongpollError {
    #[error("server descriptor request failed: {0}")]
    ServerDescriptor(#[source] TransportError),

    #[error("poll request failed: {0}")]
    Poll(#[source] TransportError),

    #[error("cursor expired (failed={failed}), server must be re-negotiated")]
    CursorExpired { failed: u32 },
}

impl LongpollError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::ServerDescriptor(TransportError::Auth { .. })
                | Self::Poll(TransportError::Auth { .. })
        )
    }
}
