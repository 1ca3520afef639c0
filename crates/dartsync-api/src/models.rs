// Board and match snapshots as served by the Autodarts cloud.
//
// Field names follow the wire format (camelCase). Everything the remote
// side may omit is defaulted so a partial payload still decodes; unknown
// fields are kept in `extra` rather than silently dropped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

// ── Board ────────────────────────────────────────────────────────────

/// Snapshot of a physical board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Match currently running on this board; absent when idle.
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub state: BoardStatus,
}

impl BoardState {
    /// The running match id, treating an empty string as absent.
    pub fn current_match(&self) -> Option<&str> {
        self.match_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Live detection state reported by the board's camera system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub num_throws: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Match ────────────────────────────────────────────────────────────

/// Snapshot of a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub id: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub scores: Vec<LegScore>,
    #[serde(default)]
    pub game_scores: Vec<serde_json::Value>,
    #[serde(default)]
    pub turns: Vec<Turn>,
    /// Index of the player to throw.
    #[serde(default)]
    pub player: usize,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub set: u32,
    #[serde(default)]
    pub leg: u32,
    #[serde(default)]
    pub finished: bool,
    /// Index of the winning player, `-1` or absent while undecided.
    #[serde(default)]
    pub winner: Option<i32>,
    #[serde(default)]
    pub turn_score: i64,
    #[serde(default)]
    pub turn_busted: bool,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub stats: Vec<serde_json::Value>,
    #[serde(default)]
    pub state: serde_json::Value,
}

/// A seat in a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, rename = "cpuPPR")]
    pub cpu_ppr: Option<f64>,
}

/// Sets and legs won so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegScore {
    #[serde(default)]
    pub sets: u32,
    #[serde(default)]
    pub legs: u32,
}

/// One player's visit to the board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub throws: Vec<Throw>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub busted: bool,
}

/// A single detected dart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throw {
    pub segment: Segment,
    #[serde(default)]
    pub coords: Option<serde_json::Value>,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub marks: Option<serde_json::Value>,
}

impl MatchState {
    /// The winner's seat, if the match has one.
    pub fn winner_index(&self) -> Option<usize> {
        self.winner.and_then(|w| usize::try_from(w).ok())
    }

    /// The turn in progress (the last one recorded).
    pub fn current_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Dart `index` of the current turn, if it has been thrown.
    pub fn throw_at(&self, index: usize) -> Option<&Throw> {
        self.current_turn().and_then(|turn| turn.throws.get(index))
    }

    /// Whether dart `index` of the current turn may be set.
    ///
    /// Thrown darts can always be revised; the next dart can only be
    /// entered while the match is still running.
    pub fn dart_editable(&self, index: usize) -> bool {
        let thrown = self.current_turn().map_or(0, |turn| turn.throws.len());
        if self.finished {
            index < thrown
        } else {
            index <= thrown
        }
    }
}

// ── Segments ─────────────────────────────────────────────────────────

/// Ring of the board a dart landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Bed {
    Single,
    /// Detected singles between bull and triple ring.
    SingleInner,
    /// Detected singles between triple and double ring.
    SingleOuter,
    Double,
    Triple,
    Outside,
}

/// A board segment as sent with throw commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub number: u8,
    pub bed: Bed,
    pub multiplier: u8,
}

impl Segment {
    /// A dart that missed the scoring area.
    pub fn miss() -> Self {
        Self {
            name: "Miss".into(),
            number: 0,
            bed: Bed::Outside,
            multiplier: 0,
        }
    }

    /// Points this segment scores.
    pub fn points(&self) -> u32 {
        u32::from(self.number) * u32::from(self.multiplier)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parses the short labels used when entering darts by hand:
/// `Miss`, `Bull`, `25`, and `S`/`D`/`T` followed by 1-20.
/// Any `M` label collapses to a plain miss.
impl FromStr for Segment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        match label {
            "Miss" => return Ok(Self::miss()),
            "Bull" => {
                return Ok(Self {
                    name: "Bull".into(),
                    number: 25,
                    bed: Bed::Double,
                    multiplier: 2,
                });
            }
            "25" => {
                return Ok(Self {
                    name: "25".into(),
                    number: 25,
                    bed: Bed::Double,
                    multiplier: 1,
                });
            }
            _ => {}
        }

        let invalid = || Error::InvalidSegment(s.to_owned());
        let mut chars = label.chars();
        let prefix = chars.next().ok_or_else(invalid)?;
        let (bed, multiplier) = match prefix {
            'M' => return Ok(Self::miss()),
            'S' => (Bed::Single, 1),
            'D' => (Bed::Double, 2),
            'T' => (Bed::Triple, 3),
            _ => return Err(invalid()),
        };
        let number: u8 = chars.as_str().parse().map_err(|_| invalid())?;
        if !(1..=20).contains(&number) {
            return Err(invalid());
        }

        Ok(Self {
            name: label.to_owned(),
            number,
            bed,
            multiplier,
        })
    }
}
