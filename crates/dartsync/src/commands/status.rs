//! `status`: one snapshot of the board and its match.

use crate::cli::GlobalOpts;
use crate::commands;
use crate::error::CliError;
use crate::output;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let view = commands::with_pairing(global, |handle| async move {
        Ok(commands::view(&handle))
    })
    .await?;

    let out = output::render_single(global.output, &view, |v| output::pairing_detail(v, color))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
