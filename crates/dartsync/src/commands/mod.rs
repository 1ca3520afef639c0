//! Command handlers, plus the profile resolution and pairing setup they share.

pub mod board;
pub mod config_cmd;
pub mod matches;
pub mod status;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use dartsync_api::{Session, SessionConfig};
use dartsync_config::Config;
use dartsync_core::{MatchState, Pairing, PairingConfig, PairingHandle};
use tracing::debug;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::PairingView;

// ── Profile resolution ───────────────────────────────────────────────

/// One profile, resolved into what a pairing needs.
pub struct Target {
    pub profile: String,
    pub session: SessionConfig,
    pub pairing: PairingConfig,
}

fn load() -> Result<Config, CliError> {
    let cfg = dartsync_config::load_config()?;
    if cfg.profiles.is_empty() {
        return Err(CliError::NoConfig {
            path: dartsync_config::config_path().display().to_string(),
        });
    }
    Ok(cfg)
}

fn resolve(cfg: &Config, name: &str, global: &GlobalOpts) -> Result<Target, CliError> {
    let Some(profile) = cfg.profiles.get(name) else {
        return Err(CliError::ProfileNotFound {
            name: name.to_owned(),
            available: cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
        });
    };

    let mut profile = profile.clone();
    if let Some(board) = &global.board {
        profile.board_id.clone_from(board);
    }

    let mut session = dartsync_config::profile_to_session_config(&profile, name, &cfg.defaults)?;
    if let Some(secs) = global.timeout {
        session.transport.timeout = Duration::from_secs(secs);
    }
    let pairing = dartsync_config::profile_to_pairing_config(&profile, name)?;

    Ok(Target {
        profile: name.to_owned(),
        session,
        pairing,
    })
}

/// The active profile: `--profile`, else the configured default.
pub fn active_target(global: &GlobalOpts) -> Result<Target, CliError> {
    let cfg = load()?;
    let name = global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into());
    resolve(&cfg, &name, global)
}

/// Every configured profile, in name order.
pub fn all_targets(global: &GlobalOpts) -> Result<Vec<Target>, CliError> {
    if global.board.is_some() {
        return Err(CliError::Validation {
            field: "board".into(),
            reason: "--board cannot be combined with --all".into(),
        });
    }
    let cfg = load()?;
    cfg.profiles
        .keys()
        .map(|name| resolve(&cfg, name, global))
        .collect()
}

// ── Pairing setup ────────────────────────────────────────────────────

/// Log in and start a pairing for a single command. Periodic polling is
/// off: the pairing only lives as long as the command.
pub async fn open(target: Target) -> Result<PairingHandle, CliError> {
    let Target {
        profile,
        session,
        mut pairing,
    } = target;
    pairing.sync.match_poll_interval = None;
    pairing.sync.board_poll_interval = None;

    let session = Session::connect(session).await?;
    debug!(profile = %profile, board = %pairing.board_id, "starting one-shot pairing");
    Ok(Pairing::start(session, pairing).await?)
}

/// Run `f` against a one-shot pairing, shutting it down afterwards
/// whether or not `f` succeeded.
pub async fn with_pairing<F, Fut, T>(global: &GlobalOpts, f: F) -> Result<T, CliError>
where
    F: FnOnce(PairingHandle) -> Fut + Send,
    Fut: Future<Output = Result<T, CliError>> + Send,
{
    let handle = open(active_target(global)?).await?;
    let result = f(handle.clone()).await;
    handle.shutdown().await;
    result
}

/// The match currently held, or `NotLoaded`.
pub fn current_match(handle: &PairingHandle) -> Result<Arc<MatchState>, CliError> {
    handle
        .match_state()
        .value
        .ok_or(CliError::NotLoaded { kind: "match" })
}

/// Snapshot a pairing for rendering.
pub fn view(handle: &PairingHandle) -> PairingView {
    PairingView {
        pairing: handle.id().to_string(),
        phase: handle.phase(),
        link: *handle.board_link().borrow(),
        board: handle.board_state().value.map(|b| (*b).clone()),
        current: handle.match_state().value.map(|m| (*m).clone()),
    }
}
