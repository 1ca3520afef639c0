//! `board`: detection control.

use dartsync_core::Command;

use crate::cli::{BoardArgs, BoardCommand, GlobalOpts};
use crate::commands;
use crate::error::CliError;

pub async fn handle(args: BoardArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (command, done) = match args.command {
        BoardCommand::Start => (Command::StartBoard, "started"),
        BoardCommand::Stop => (Command::StopBoard, "stopped"),
        BoardCommand::Reset => (Command::ResetBoard, "reset"),
    };

    let board_id = commands::with_pairing(global, |handle| async move {
        handle.execute(command).await?;
        Ok(handle.board_id().to_owned())
    })
    .await?;

    if !global.quiet {
        eprintln!("✓ Board {board_id} {done}");
    }
    Ok(())
}
