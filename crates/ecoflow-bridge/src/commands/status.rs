//! Status handler: fetch all quotas once and show the decoded view.

use crate::cli::{GlobalOpts, TargetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: TargetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (gateway, device) = util::open_device(&args, global)?;
    let result = device.initialize().await;
    gateway.shutdown().await;
    result?;

    let status = device.status();
    let out = output::render_single(
        global.output,
        &status,
        |s| output::render_fields(s.known_fields()),
        |s| {
            s.known_fields()
                .into_iter()
                .map(|(label, value)| format!("{label}\t{value}"))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
