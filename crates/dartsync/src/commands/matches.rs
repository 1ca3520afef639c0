//! `match`: commands against the board's current match.

use dartsync_core::{Command, MatchState, Segment};

use crate::cli::{GlobalOpts, MatchArgs, MatchCommand};
use crate::commands;
use crate::error::CliError;

/// What to send, decided once the match is known.
enum Plan {
    Fixed(Command),
    Next,
    End,
    Throw { segment: Segment, index: Option<usize> },
}

impl Plan {
    fn parse(command: MatchCommand) -> Result<Self, CliError> {
        Ok(match command {
            MatchCommand::Next => Self::Next,
            MatchCommand::NextPlayer => Self::Fixed(Command::NextPlayer),
            MatchCommand::NextLeg => Self::Fixed(Command::NextLeg),
            MatchCommand::Undo => Self::Fixed(Command::Undo),
            MatchCommand::End => Self::End,
            MatchCommand::Abort => Self::Fixed(Command::AbortMatch),
            MatchCommand::Finish => Self::Fixed(Command::FinishMatch),
            MatchCommand::Throw { segment, index } => Self::Throw {
                segment: segment.parse()?,
                index,
            },
        })
    }

    fn resolve(self, state: &MatchState) -> Result<Command, CliError> {
        Ok(match self {
            Self::Fixed(command) => command,
            Self::Next => Command::next_for(state),
            Self::End => Command::end_for(state),
            Self::Throw {
                segment,
                index: None,
            } => Command::Throw {
                segment,
                index: None,
            },
            Self::Throw {
                segment,
                index: Some(index),
            } => Command::throw_for(state, index, segment)?,
        })
    }
}

pub async fn handle(args: MatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Bad input fails before logging in.
    let plan = Plan::parse(args.command)?;

    let (match_id, sent) = commands::with_pairing(global, |handle| async move {
        let state = commands::current_match(&handle)?;
        let command = plan.resolve(&state)?;
        let sent = format!("{command:?}");
        handle.execute(command).await?;
        Ok((state.id.clone(), sent))
    })
    .await?;

    if !global.quiet {
        eprintln!("✓ {sent} sent to match {match_id}");
    }
    Ok(())
}
