//! Set command handler.

use ecoflow_core::{CommandRoute, Device, SetCommand};
use tracing::warn;

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

async fn send(
    device: &Device,
    command: SetCommand,
    args: &SetArgs,
    wait_for_reply: bool,
) -> Result<(), CliError> {
    // Some encoders read current values (AC voltage, brightness scale).
    device.initialize().await?;

    let route = if args.http {
        CommandRoute::Http
    } else {
        if wait_for_reply {
            device.subscribe().await?;
        }
        CommandRoute::Mqtt
    };

    match device.send_command_via(command, route).await {
        Ok(()) => Ok(()),
        Err(e) if args.no_revert => Err(e.into()),
        Err(e) => {
            if e.can_revert() {
                warn!(sn = device.serial_number(), command = command.name(), "Reverting optimistic update");
            }
            Err(e.revert().into())
        }
    }
}

pub async fn handle(args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let command = util::parse_command(args.setting, &args.value)?;
    let (gateway, device) = util::open_device(&args.target, global)?;
    let wait_for_reply = gateway.config().reply_timeout.is_some();

    let result = send(&device, command, &args, wait_for_reply).await;
    gateway.shutdown().await;
    result?;

    if !global.quiet {
        let verb = if wait_for_reply && !args.http {
            "acknowledged by"
        } else {
            "sent to"
        };
        eprintln!("{} {verb} {}", command.name(), device.name());
    }

    let status = device.status();
    let out = output::render_single(
        global.output,
        &status,
        |s| output::render_fields(s.known_fields()),
        |_| String::new(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
