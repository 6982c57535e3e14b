//! Command dispatch: bridges CLI args -> gateway operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod quotas;
pub mod run;
pub mod set;
pub mod status;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(args, global),
        Command::Status(args) => status::handle(args, global).await,
        Command::Quotas(args) => quotas::handle(args, global).await,
        Command::Set(args) => set::handle(args, global).await,
        Command::Run(args) => run::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        // Completions are generated before dispatch
        Command::Completions(_) => Ok(()),
    }
}
