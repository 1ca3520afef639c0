//! `watch`: follow one or all profiles until Ctrl-C.

use dartsync_api::Session;
use dartsync_core::{PairingHandle, Supervisor};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::commands::{self, Target};
use crate::error::CliError;
use crate::output;

/// How each broadcast is printed.
#[derive(Clone, Copy)]
struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn render(self, handle: &PairingHandle) -> Result<String, CliError> {
        let view = commands::view(handle);
        match self.format {
            OutputFormat::Table => Ok(output::pairing_line(&view, self.color)),
            // One object per line while streaming.
            OutputFormat::Json | OutputFormat::JsonCompact => {
                output::render_single(OutputFormat::JsonCompact, &view, |_| String::new())
            }
            OutputFormat::Yaml => output::render_single(self.format, &view, |_| String::new())
                .map(|doc| format!("---\n{}", doc.trim_end())),
        }
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let targets = if args.all {
        commands::all_targets(global)?
    } else {
        vec![commands::active_target(global)?]
    };

    let printer = Printer {
        format: global.output,
        color: output::should_color(global.color),
        quiet: global.quiet,
    };

    let supervisor = Supervisor::new();
    let mut followers = Vec::new();

    let started = start_all(&supervisor, targets, printer, &mut followers).await;
    let interrupted = match started {
        Ok(()) => {
            info!(pairings = supervisor.len(), "watching, Ctrl-C to stop");
            tokio::signal::ctrl_c().await.map_err(CliError::from)
        }
        Err(e) => Err(e),
    };

    for follower in &followers {
        follower.abort();
    }
    let stopped = supervisor.shutdown_all().await;
    info!(stopped, "pairings stopped");
    interrupted
}

async fn start_all(
    supervisor: &Supervisor,
    targets: Vec<Target>,
    printer: Printer,
    followers: &mut Vec<JoinHandle<()>>,
) -> Result<(), CliError> {
    for Target {
        profile,
        session,
        pairing,
    } in targets
    {
        let session = Session::connect(session).await?;
        let handle = supervisor.create(session, pairing).await?;
        info!(profile = %profile, board = %handle.board_id(), "pairing started");
        followers.push(tokio::spawn(follow(handle, printer)));
    }
    Ok(())
}

/// Print the pairing on every board, match, or link change until its
/// coordinators are torn down. Repeated identical renderings are skipped.
async fn follow(handle: PairingHandle, printer: Printer) {
    let mut board = handle.board();
    let mut matches = handle.matches();
    let mut link = handle.board_link();
    let mut last = String::new();

    loop {
        match printer.render(&handle) {
            Ok(rendered) if rendered != last => {
                output::print_output(&rendered, printer.quiet);
                last = rendered;
            }
            Ok(_) => {}
            Err(e) => warn!(pairing = %handle.id(), error = %e, "failed to render update"),
        }

        let open = tokio::select! {
            changed = board.changed() => changed.is_some(),
            changed = matches.changed() => changed.is_some(),
            changed = link.changed() => changed.is_ok(),
        };
        if !open {
            break;
        }
    }
}
