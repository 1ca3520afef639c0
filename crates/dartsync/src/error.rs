//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use dartsync_config::ConfigError;
use dartsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Autodarts cloud")]
    #[diagnostic(
        code(dartsync::connection_failed),
        help(
            "{reason}\n\
             Check your network, or api_url / ws_url in the profile."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(dartsync::auth_failed),
        help(
            "Verify the account email and password.\n\
             Run: dartsync config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(dartsync::no_credentials),
        help(
            "Store one with: dartsync config set-password --profile {profile}\n\
             Or set the DARTSYNC_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{kind} '{id}' not found")]
    #[diagnostic(
        code(dartsync::not_found),
        help("Check board_id in the profile, or pass --board.")
    )]
    NotFound { kind: String, id: String },

    #[error("No {kind} is running on the board")]
    #[diagnostic(
        code(dartsync::not_loaded),
        help("Start a match in Autodarts first, then retry.")
    )]
    NotLoaded { kind: &'static str },

    #[error("Rejected by the Autodarts cloud (HTTP {status}): {message}")]
    #[diagnostic(code(dartsync::rejected))]
    Rejected { status: u16, message: String },

    #[error("Pairing '{id}' is already running")]
    #[diagnostic(
        code(dartsync::conflict),
        help("Two profiles follow the same name; rename one of them.")
    )]
    Conflict { id: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(dartsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(dartsync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: dartsync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(dartsync::no_config),
        help(
            "Create one with: dartsync config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(dartsync::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(dartsync::timeout),
        help("Increase the timeout with --timeout or in the profile.")
    )]
    Timeout { seconds: u64 },

    // ── Engine ───────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(dartsync::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(dartsync::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NotLoaded { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } | Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Config(_) => exit_code::USAGE,
            Self::Internal(_) | Self::Io(_) | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

// ── Conversion from lower layers ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCredentials { email } => CliError::AuthFailed {
                message: format!("invalid credentials for {email}"),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::NotFound { kind, id } => CliError::NotFound { kind, id },
            CoreError::NotLoaded { kind } => CliError::NotLoaded { kind },
            CoreError::InvalidDart { index } => CliError::Validation {
                field: "index".into(),
                reason: format!("dart {index} of the current turn cannot be set"),
            },
            CoreError::InvalidSegment(label) => CliError::Validation {
                field: "segment".into(),
                reason: format!("unknown segment '{label}'"),
            },
            CoreError::Rejected { status, message } => CliError::Rejected { status, message },
            CoreError::PairingExists { id } => CliError::Conflict { id },
            other @ (CoreError::PairingNotFound { .. }
            | CoreError::PairingStopped
            | CoreError::Internal(_)) => CliError::Internal(other.to_string()),
        }
    }
}

impl From<dartsync_api::Error> for CliError {
    fn from(err: dartsync_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Render(err.to_string())
    }
}
