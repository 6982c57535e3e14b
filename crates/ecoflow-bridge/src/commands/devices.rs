//! Device listing handlers. These only read the config file.

use ecoflow_config::DeviceEntry;
use ecoflow_core::{DeviceModel, ProductLine};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Configured device without its secret.
#[derive(Serialize)]
struct DeviceInfo {
    name: String,
    serial_number: String,
    model: DeviceModel,
    product_line: String,
    access_key: String,
    /// Where the secret key comes from.
    secret: &'static str,
}

impl From<&DeviceEntry> for DeviceInfo {
    fn from(d: &DeviceEntry) -> Self {
        let secret = if d.secret_key_env.is_some() {
            "env"
        } else if d.secret_key.is_some() {
            "plaintext"
        } else {
            "keyring"
        };
        Self {
            name: d.name.clone(),
            serial_number: d.serial_number.clone(),
            model: d.model,
            product_line: d.model.product_line().to_string(),
            access_key: d.access_key.clone(),
            secret,
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Serial")]
    serial_number: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Product line")]
    product_line: String,
    #[tabled(rename = "Access key")]
    access_key: String,
    #[tabled(rename = "Secret")]
    secret: &'static str,
}

impl From<&DeviceInfo> for DeviceRow {
    fn from(d: &DeviceInfo) -> Self {
        Self {
            name: d.name.clone(),
            serial_number: d.serial_number.clone(),
            model: d.model.to_string(),
            product_line: d.product_line.clone(),
            access_key: d.access_key.clone(),
            secret: d.secret,
        }
    }
}

#[derive(Serialize)]
struct ModelInfo {
    model: DeviceModel,
    product_line: String,
    writable: bool,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Product line")]
    product_line: String,
    #[tabled(rename = "Commands")]
    writable: &'static str,
}

fn model_info(model: DeviceModel) -> ModelInfo {
    ModelInfo {
        model,
        product_line: model.product_line().to_string(),
        writable: model.product_line() != ProductLine::PowerOcean,
    }
}

pub fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let cfg = config::load(global)?;
            let devices: Vec<DeviceInfo> = cfg.devices.iter().map(DeviceInfo::from).collect();
            let out = output::render_list(
                global.output,
                &devices,
                |d| DeviceRow::from(d),
                |d| d.serial_number.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Models => {
            let models: Vec<ModelInfo> = DeviceModel::all().map(model_info).collect();
            let out = output::render_list(
                global.output,
                &models,
                |m| ModelRow {
                    model: m.model.to_string(),
                    product_line: m.product_line.clone(),
                    writable: if m.writable { "read/write" } else { "read-only" },
                },
                |m| m.model.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
