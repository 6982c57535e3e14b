//! Quota dump handler: the raw snapshot keyed by quota name.

use serde_json::{Map, Value};

use crate::cli::{GlobalOpts, TargetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub async fn handle(args: TargetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (gateway, device) = util::open_device(&args, global)?;
    let result = device.initialize().await;
    gateway.shutdown().await;
    result?;

    let quotas: Map<String, Value> = device
        .snapshot()
        .iter()
        .map(|(key, value)| (key.to_owned(), value.clone()))
        .collect();
    if quotas.is_empty() {
        tracing::warn!(sn = device.serial_number(), "Cloud returned no quotas");
    }

    let out = output::render_single(
        global.output,
        &quotas,
        |q| output::render_fields(q.iter().map(|(k, v)| (k.as_str(), render_value(v)))),
        |q| {
            q.iter()
                .map(|(k, v)| format!("{k}={}", render_value(v)))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
