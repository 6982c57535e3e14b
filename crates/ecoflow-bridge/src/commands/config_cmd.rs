//! Config subcommand handlers.

use ecoflow_config::{self as config_file, Config, DeviceEntry};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Config with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for device in &mut cfg.devices {
        if device.secret_key.is_some() {
            device.secret_key = Some("***".into());
        }
    }
    cfg
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&config::load(global)?);
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("{c:#?}\n# {e}")),
                |c| {
                    c.devices
                        .iter()
                        .map(|d| d.serial_number.clone())
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::AddDevice {
            name,
            serial_number,
            model,
            key,
            plaintext_secret,
            secret_env,
        } => {
            let mut cfg = config::load(global)?;
            if cfg.device(&serial_number).is_some() || cfg.device(&name).is_some() {
                return Err(CliError::Validation {
                    field: "device".into(),
                    reason: format!("'{name}' ({serial_number}) is already configured"),
                });
            }
            cfg.devices.push(DeviceEntry {
                name: name.clone(),
                serial_number,
                model,
                access_key: key,
                secret_key: plaintext_secret,
                secret_key_env: secret_env,
            });
            config_file::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Device '{name}' added to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::RemoveDevice { device } => {
            let mut cfg = config::load(global)?;
            let before = cfg.devices.len();
            cfg.devices
                .retain(|d| d.serial_number != device && !d.name.eq_ignore_ascii_case(&device));
            if cfg.devices.len() == before {
                return Err(CliError::device_not_found(device));
            }
            config_file::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Device '{device}' removed");
            }
            Ok(())
        }

        ConfigCommand::SetSecret { key, secret } => {
            config_file::store_secret_key(&key, &secret)?;
            if !global.quiet {
                eprintln!("Secret key for {key} stored in the system keyring");
            }
            Ok(())
        }
    }
}
