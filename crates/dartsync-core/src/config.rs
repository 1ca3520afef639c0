// ── Runtime configuration ──
//
// Plain data handed to a pairing at start. Nothing here reads files or
// the environment; `dartsync-config` builds these from a profile.

use std::fmt;
use std::time::Duration;

/// Identifies one board/match pairing under a supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairingId(String);

impl PairingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PairingId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// How a coordinator reopens a push channel that closed unexpectedly.
///
/// A zero `initial_delay` reopens inline on every closure with no limit,
/// which is the default. Non-zero delays back off exponentially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reopen attempt.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay.
    pub max_delay: Duration,

    /// Attempts before the link is reported as failed.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl ReconnectPolicy {
    /// Reopen at once, every time.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_retries: None,
        }
    }

    /// Exponential backoff from 1s up to 30s, retrying forever.
    pub fn backoff() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.initial_delay.is_zero()
    }

    /// Whether `attempt` (zero-based) is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries.is_none_or(|max| attempt < max)
    }

    /// Exponential backoff with jitter.
    ///
    /// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.is_immediate() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic jitter from the attempt number only: pairings that
        // dropped together still share one schedule.
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }
}

// ── SyncConfig ───────────────────────────────────────────────────────

/// Timing knobs for one pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Periodic board re-fetch. Off by default: the push channel and
    /// the match handlers keep the board current.
    pub board_poll_interval: Option<Duration>,

    /// Periodic match reconciliation. Default: 30s.
    pub match_poll_interval: Option<Duration>,

    /// Upper bound on the end-of-match and reset handlers. Default: 60s.
    pub handler_timeout: Duration,

    pub reconnect: ReconnectPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            board_poll_interval: None,
            match_poll_interval: Some(Duration::from_secs(30)),
            handler_timeout: Duration::from_secs(60),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// One board to mirror, and how.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    pub id: PairingId,
    pub board_id: String,
    pub sync: SyncConfig,
}

impl PairingConfig {
    /// Pairing keyed by its board id, with default timings.
    pub fn for_board(board_id: impl Into<String>) -> Self {
        let board_id = board_id.into();
        Self {
            id: PairingId::new(board_id.clone()),
            board_id,
            sync: SyncConfig::default(),
        }
    }
}
