// ── Derived views ──
//
// Read-only summaries computed from the two coordinator values.

use dartsync_api::{BoardState, MatchState};
use serde::Serialize;
use strum::{Display, EnumString};

/// Where the board is in its match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    /// Board online, no match yet.
    Waiting,
    Started,
    Finished,
}

impl MatchPhase {
    /// `None` means unknown: no board, an offline board without a match,
    /// or a match id whose match has not been loaded yet.
    pub fn derive(
        board: Option<&BoardState>,
        board_online: bool,
        current: Option<&MatchState>,
    ) -> Option<Self> {
        let board = board?;
        if board.current_match().is_none() {
            return board_online.then_some(Self::Waiting);
        }
        current.map(|game| {
            if game.finished {
                Self::Finished
            } else {
                Self::Started
            }
        })
    }
}
