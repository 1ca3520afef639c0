// ── Core error types ──
//
// Errors surfaced by the sync engine. Consumers never see HTTP status codes
// or websocket details directly; the `From<dartsync_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.
// Bad credentials stay distinct so setup can report them as such.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Setup errors ─────────────────────────────────────────────────
    #[error("Invalid credentials for {email}")]
    InvalidCredentials { email: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot reach the Autodarts cloud: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("No {kind} is currently loaded")]
    NotLoaded { kind: &'static str },

    #[error("Dart {index} of the current turn cannot be set")]
    InvalidDart { index: usize },

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Rejected by the Autodarts cloud (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    // ── Pairing errors ───────────────────────────────────────────────
    #[error("Pairing already running: {id}")]
    PairingExists { id: String },

    #[error("Unknown pairing: {id}")]
    PairingNotFound { id: String },

    #[error("Pairing has shut down")]
    PairingStopped,

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether setup should give up rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. } | Self::AuthenticationFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<dartsync_api::Error> for CoreError {
    fn from(err: dartsync_api::Error) -> Self {
        use dartsync_api::Error as Api;

        match err {
            Api::InvalidCredentials { email } => CoreError::InvalidCredentials { email },
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::SessionExpired => CoreError::AuthenticationFailed {
                message: "Session expired -- re-authentication required".into(),
            },
            Api::Transport(e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::ConnectionFailed {
                reason: format!("Invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            Api::Api { status, message } => CoreError::Rejected { status, message },
            Api::NotFound { kind, id } => CoreError::NotFound {
                kind: kind.to_owned(),
                id,
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            Api::InvalidSegment(label) => CoreError::InvalidSegment(label),
        }
    }
}
