//! Output formatting: table, JSON, YAML.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`
//! and hand-built summaries, structured formats use serde.

use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use dartsync_core::{BoardState, LinkState, MatchPhase, MatchState};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

fn paint_phase(phase: Option<MatchPhase>, color: bool) -> String {
    let label = phase.map_or_else(|| "unknown".to_owned(), |p| p.to_string());
    if !color {
        return label;
    }
    match phase {
        Some(MatchPhase::Waiting) => label.yellow().to_string(),
        Some(MatchPhase::Started) => label.green().bold().to_string(),
        Some(MatchPhase::Finished) => label.cyan().to_string(),
        None => label.dimmed().to_string(),
    }
}

fn paint_link(link: LinkState, color: bool) -> String {
    let label = link.to_string();
    if !color {
        return label;
    }
    match link {
        LinkState::Online => label.green().to_string(),
        LinkState::Reconnecting { .. } => label.yellow().to_string(),
        LinkState::Failed => label.red().bold().to_string(),
        LinkState::Offline => label.dimmed().to_string(),
    }
}

// ── Views ────────────────────────────────────────────────────────────

/// Everything `status` and `watch` know about one pairing.
#[derive(Debug, Serialize)]
pub struct PairingView {
    pub pairing: String,
    pub phase: Option<MatchPhase>,
    #[serde(serialize_with = "serialize_link")]
    pub link: LinkState,
    pub board: Option<BoardState>,
    #[serde(rename = "match")]
    pub current: Option<MatchState>,
}

fn serialize_link<S: serde::Serializer>(link: &LinkState, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(link)
}

#[derive(Tabled)]
struct PlayerRow {
    #[tabled(rename = "#")]
    seat: usize,
    #[tabled(rename = "Player")]
    name: String,
    #[tabled(rename = "Sets")]
    sets: u32,
    #[tabled(rename = "Legs")]
    legs: u32,
    #[tabled(rename = "")]
    marker: &'static str,
}

fn player_rows(state: &MatchState) -> Vec<PlayerRow> {
    let winner = state.winner_index();
    state
        .players
        .iter()
        .enumerate()
        .map(|(seat, player)| {
            let score = state.scores.get(seat).copied().unwrap_or_default();
            let marker = if winner == Some(seat) {
                "winner"
            } else if !state.finished && state.player == seat {
                "to throw"
            } else {
                ""
            };
            PlayerRow {
                seat: seat + 1,
                name: player.name.clone(),
                sets: score.sets,
                legs: score.legs,
                marker,
            }
        })
        .collect()
}

fn board_summary(out: &mut String, board: Option<&BoardState>) {
    let Some(board) = board else {
        let _ = writeln!(out, "Board:  (not loaded)");
        return;
    };
    let name = if board.name.is_empty() { &board.id } else { &board.name };
    let _ = writeln!(out, "Board:  {name} ({})", board.id);
    let detection = match (board.state.connected, board.state.status.as_deref()) {
        (false, _) => "disconnected".to_owned(),
        (true, Some(status)) => status.to_owned(),
        (true, None) => "connected".to_owned(),
    };
    let _ = writeln!(out, "        detection: {detection}, throws: {}", board.state.num_throws);
}

fn match_summary(out: &mut String, current: Option<&MatchState>) {
    let Some(state) = current else {
        return;
    };
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Match:  {} ({}) set {} leg {} round {}",
        state.variant, state.id, state.set, state.leg, state.round
    );
    if let Some(turn) = state.current_turn() {
        let darts: Vec<String> = turn.throws.iter().map(|t| t.segment.to_string()).collect();
        let busted = if state.turn_busted { " BUST" } else { "" };
        let _ = writeln!(
            out,
            "        turn: [{}] = {}{busted}",
            darts.join(", "),
            state.turn_score
        );
    }
    if !state.players.is_empty() {
        let _ = write!(
            out,
            "{}",
            Table::new(player_rows(state)).with(Style::rounded())
        );
        let _ = writeln!(out);
    }
}

/// Multi-line summary of a pairing.
pub fn pairing_detail(view: &PairingView, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Pairing: {}  phase: {}  link: {}",
        view.pairing,
        paint_phase(view.phase, color),
        paint_link(view.link, color)
    );
    board_summary(&mut out, view.board.as_ref());
    match_summary(&mut out, view.current.as_ref());
    out.trim_end().to_owned()
}

/// One-line summary for a single broadcast while watching.
pub fn pairing_line(view: &PairingView, color: bool) -> String {
    let mut line = format!("[{}] {}", view.pairing, paint_phase(view.phase, color));
    if let Some(state) = &view.current {
        let _ = write!(line, " {} {}", state.variant, state.id);
        if let Some(player) = state.players.get(state.player).filter(|_| !state.finished) {
            let _ = write!(line, " -- {} to throw", player.name);
        }
        if let Some(turn) = state.current_turn() {
            let darts: Vec<String> = turn.throws.iter().map(|t| t.segment.to_string()).collect();
            if !darts.is_empty() {
                let _ = write!(line, " [{}]", darts.join(" "));
            }
        }
    }
    line
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since detail views don't use the
/// `Tabled` derive.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
