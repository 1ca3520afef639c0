use thiserror::Error;

/// Top-level error type for the `dartsync-api` crate.
///
/// Covers every failure mode across the cloud surfaces:
/// authentication, transport, snapshot fetches, commands, and push channels.
/// `dartsync-core` maps these into synchronization-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The identity provider rejected the email/password pair.
    #[error("Invalid credentials for {email}")]
    InvalidCredentials { email: String },

    /// Login or token exchange failed for a reason other than bad credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Access token rejected by the API and could not be renewed.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Remote API ──────────────────────────────────────────────────
    /// Non-success response from a board or match endpoint.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The requested board or match does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // ── Push channel ────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A dart label that does not name a board segment.
    #[error("Unknown segment: {0}")]
    InvalidSegment(String),
}

impl Error {
    /// Returns `true` if this error indicates auth has expired
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::NotFound { .. } | Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert!(
            !Error::InvalidCredentials {
                email: "a@b.c".into()
            }
            .is_auth_expired()
        );
        assert!(
            Error::NotFound {
                kind: "match",
                id: "m1".into()
            }
            .is_not_found()
        );
        assert!(Error::SessionExpired.is_auth_expired());
    }
}
