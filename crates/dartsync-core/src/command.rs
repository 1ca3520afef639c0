// ── Command API ──
//
// Every write to the board or match flows through `Command`. The pairing
// task routes each variant to the held entity, so commands are ordered
// with respect to push events and refreshes.

use dartsync_api::{MatchState, Segment};
use tokio::sync::oneshot;

use crate::error::CoreError;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<(), CoreError>>,
}

/// All write operations a pairing accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ── Board ────────────────────────────────────────────────────────
    StartBoard,
    StopBoard,
    ResetBoard,
    /// Open the board push channel, then re-check the match.
    ConnectBoard,
    /// Close the board push channel, then re-check the match.
    DisconnectBoard,
    RefreshBoard,

    // ── Match ────────────────────────────────────────────────────────
    RefreshMatch,
    NextPlayer,
    NextLeg,
    Undo,
    /// Submit a dart, or revise dart `index` of the current turn.
    Throw {
        segment: Segment,
        index: Option<usize>,
    },
    AbortMatch,
    FinishMatch,
}

impl Command {
    /// The "next" action for a match: a new leg once the current one
    /// is finished, otherwise the next player.
    pub fn next_for(state: &MatchState) -> Self {
        if state.finished {
            Self::NextLeg
        } else {
            Self::NextPlayer
        }
    }

    /// The "end" action for a match: finish a finished match, abort a
    /// running one.
    pub fn end_for(state: &MatchState) -> Self {
        if state.finished {
            Self::FinishMatch
        } else {
            Self::AbortMatch
        }
    }

    /// Set dart `index` of the current turn to `segment`. A dart already
    /// thrown is revised in place; the next free slot is submitted.
    pub fn throw_for(state: &MatchState, index: usize, segment: Segment) -> Result<Self, CoreError> {
        if !state.dart_editable(index) {
            return Err(CoreError::InvalidDart { index });
        }
        let index = state.throw_at(index).map(|_| index);
        Ok(Self::Throw { segment, index })
    }

    /// Whether the command needs a held match.
    pub fn targets_match(&self) -> bool {
        !matches!(
            self,
            Self::StartBoard
                | Self::StopBoard
                | Self::ResetBoard
                | Self::ConnectBoard
                | Self::DisconnectBoard
                | Self::RefreshBoard
        )
    }
}
