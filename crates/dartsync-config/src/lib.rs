//! Shared configuration for dartsync.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to the runtime types of `dartsync_api` and
//! `dartsync_core`. The core never reads files; everything it needs
//! is built here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dartsync_api::{Credentials, SessionConfig, TlsMode, TransportConfig};
use dartsync_core::{PairingConfig, PairingId, ReconnectPolicy, SyncConfig};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const KEYRING_SERVICE: &str = "dartsync";
const PASSWORD_ENV: &str = "DARTSYNC_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account/board profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(name, profile)| (name.as_str(), profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Settings every profile inherits unless it overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    #[serde(default = "default_realm")]
    pub realm: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            api_url: default_api_url(),
            auth_url: default_auth_url(),
            ws_url: default_ws_url(),
            realm: default_realm(),
            client_id: default_client_id(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_api_url() -> String {
    "https://api.autodarts.io".into()
}
fn default_auth_url() -> String {
    "https://login.autodarts.io".into()
}
fn default_ws_url() -> String {
    "wss://api.autodarts.io/ms/v0/subscribe".into()
}
fn default_realm() -> String {
    "autodarts".into()
}
fn default_client_id() -> String {
    "autodarts-play".into()
}
fn default_timeout() -> u64 {
    30
}

/// One Autodarts account and the board it follows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Account email.
    pub email: String,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Board to mirror.
    pub board_id: String,

    pub api_url: Option<String>,
    pub auth_url: Option<String>,
    pub ws_url: Option<String>,
    pub realm: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override request timeout (seconds).
    pub timeout: Option<u64>,

    /// Periodic match reconciliation (seconds). 0 disables it.
    pub match_poll_secs: Option<u64>,

    /// Periodic board re-fetch (seconds). Off unless set.
    pub board_poll_secs: Option<u64>,

    /// Upper bound on the end-of-match and reset handlers (seconds).
    pub handler_timeout_secs: Option<u64>,

    pub reconnect: Option<ReconnectSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    /// Reopen at once on every closure.
    Immediate,
    #[default]
    Backoff,
}

/// How a dropped push channel is reopened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default)]
    pub mode: ReconnectMode,
    pub initial_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

impl ReconnectSettings {
    pub fn to_policy(&self) -> ReconnectPolicy {
        match self.mode {
            ReconnectMode::Immediate => ReconnectPolicy {
                max_retries: self.max_retries,
                ..ReconnectPolicy::immediate()
            },
            ReconnectMode::Backoff => {
                let base = ReconnectPolicy::backoff();
                ReconnectPolicy {
                    initial_delay: self
                        .initial_delay_secs
                        .map_or(base.initial_delay, Duration::from_secs),
                    max_delay: self
                        .max_delay_secs
                        .map_or(base.max_delay, Duration::from_secs),
                    max_retries: self.max_retries,
                }
            }
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "dartsync", "dartsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("dartsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. Layers: defaults, the file (if present),
/// then `DARTSYNC_` variables with `__` separating nested keys.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DARTSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Resolve the account password.
///
/// Order: the profile's `password_env` variable, `DARTSYNC_PASSWORD`,
/// the system keyring, then plaintext in the profile.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 3. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

// ── Runtime config ──────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `SessionConfig` from a profile, filling gaps from `defaults`.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    if profile.email.is_empty() {
        return Err(ConfigError::Validation {
            field: "email".into(),
            reason: "must not be empty".into(),
        });
    }

    let api_url = parse_url("api_url", profile.api_url.as_deref().unwrap_or(&defaults.api_url))?;
    let auth_url = parse_url(
        "auth_url",
        profile.auth_url.as_deref().unwrap_or(&defaults.auth_url),
    )?;
    let ws_url = parse_url("ws_url", profile.ws_url.as_deref().unwrap_or(&defaults.ws_url))?;

    let password = resolve_password(profile, profile_name)?;

    let tls = profile
        .ca_cert
        .clone()
        .map_or(TlsMode::System, TlsMode::CustomCa);
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    Ok(SessionConfig {
        api_url,
        auth_url,
        ws_url,
        realm: profile.realm.clone().unwrap_or_else(|| defaults.realm.clone()),
        client_id: profile
            .client_id
            .clone()
            .unwrap_or_else(|| defaults.client_id.clone()),
        client_secret: profile.client_secret.clone().map(SecretString::from),
        credentials: Credentials {
            email: profile.email.clone(),
            password,
        },
        transport: TransportConfig { tls, timeout },
    })
}

/// Build the pairing for a profile. Profiles reconnect with backoff
/// unless they ask for `immediate`.
pub fn profile_to_pairing_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<PairingConfig, ConfigError> {
    if profile.board_id.is_empty() {
        return Err(ConfigError::Validation {
            field: "board_id".into(),
            reason: "must not be empty".into(),
        });
    }

    let defaults = SyncConfig::default();
    let match_poll_interval = match profile.match_poll_secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => defaults.match_poll_interval,
    };
    let board_poll_interval = profile
        .board_poll_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    let handler_timeout = profile
        .handler_timeout_secs
        .map_or(defaults.handler_timeout, Duration::from_secs);
    let reconnect = profile
        .reconnect
        .clone()
        .unwrap_or_default()
        .to_policy();

    Ok(PairingConfig {
        id: PairingId::new(profile_name),
        board_id: profile.board_id.clone(),
        sync: SyncConfig {
            board_poll_interval,
            match_poll_interval,
            handler_timeout,
            reconnect,
        },
    })
}
