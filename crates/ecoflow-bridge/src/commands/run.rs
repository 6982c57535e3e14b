//! Run handler: subscribe devices and print updates until interrupted.
//!
//! Table and plain output print one human-readable line per status change;
//! the structured formats print one compact JSON object per line.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, Utc};
use ecoflow_core::{Device, DeviceStatus, SessionState};
use futures_util::StreamExt;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Events ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event<'a> {
    Status {
        time: String,
        sn: &'a str,
        name: &'a str,
        status: &'a DeviceStatus,
    },
    Quota {
        time: String,
        sn: &'a str,
        message: &'a Value,
    },
    Connection {
        time: String,
        connection: &'a str,
        state: String,
    },
}

#[derive(Clone, Copy)]
struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn structured(self) -> bool {
        !matches!(self.format, OutputFormat::Table | OutputFormat::Plain)
    }

    fn label(self, name: &str) -> String {
        if self.color {
            name.bold().cyan().to_string()
        } else {
            name.to_owned()
        }
    }

    fn emit(self, event: &Event<'_>, human: impl FnOnce() -> String) {
        let line = if self.structured() {
            match output::render_json(event, true) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Dropping unprintable event");
                    return;
                }
            }
        } else {
            format!("{} {}", Local::now().format("%H:%M:%S"), human())
        };
        output::print_output(&line, self.quiet);
    }
}

fn summary(status: &DeviceStatus) -> String {
    let fields = status.known_fields();
    if fields.is_empty() {
        return "(no data yet)".into();
    }
    fields
        .into_iter()
        .map(|(label, value)| format!("{label} {value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Watchers ─────────────────────────────────────────────────────────

async fn watch_status(device: Device, printer: Printer) {
    let mut snapshots = device.snapshot_stream();
    let mut last: Option<DeviceStatus> = None;
    while let Some(snapshot) = snapshots.next().await {
        let status = device.codec().status(&snapshot);
        if last.as_ref() == Some(&status) {
            continue;
        }
        let event = Event::Status {
            time: Utc::now().to_rfc3339(),
            sn: device.serial_number(),
            name: device.name(),
            status: &status,
        };
        printer.emit(&event, || {
            format!("{} {}", printer.label(device.name()), summary(&status))
        });
        last = Some(status);
    }
}

async fn watch_quotas(device: Device, printer: Printer) {
    let mut messages = device.quota_stream();
    while let Some(message) = messages.next().await {
        let event = Event::Quota {
            time: Utc::now().to_rfc3339(),
            sn: device.serial_number(),
            message: &message,
        };
        printer.emit(&event, || {
            format!("{} quota {message}", printer.label(device.serial_number()))
        });
    }
}

async fn watch_connection(device: Device, printer: Printer) {
    let connection = format!("{:?}", device.connection().key());
    let mut states = device.connection_state();
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        if state == SessionState::Connected {
            info!(sn = device.serial_number(), "MQTT session up");
        }
        let event = Event::Connection {
            time: Utc::now().to_rfc3339(),
            connection: &connection,
            state: state.to_string(),
        };
        printer.emit(&event, || format!("connection {state}"));
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let devices = config::resolve_devices(&cfg, global, &args.devices, args.model)?;
    let gateway = config::build_gateway(&cfg, global, &devices, Some(args.sim_interval))?;
    let handles = devices
        .iter()
        .map(|device| gateway.add_device(device))
        .collect::<Result<Vec<_>, _>>()?;

    let printer = Printer {
        format: global.output,
        color: output::should_color(global.color),
        quiet: global.quiet,
    };

    let mut tasks = JoinSet::new();
    let mut watched_connections = HashSet::new();
    for device in &handles {
        if let Err(e) = device.initialize().await {
            warn!(sn = device.serial_number(), error = %e, "Initial quota fetch failed");
        }
        if watched_connections.insert(Arc::as_ptr(device.connection())) {
            tasks.spawn(watch_connection(device.clone(), printer));
        }
        tasks.spawn(watch_status(device.clone(), printer));
        if args.raw {
            tasks.spawn(watch_quotas(device.clone(), printer));
        }
    }

    for device in &handles {
        if let Err(e) = device.subscribe().await {
            tasks.abort_all();
            gateway.shutdown().await;
            return Err(e.into());
        }
    }
    info!(devices = handles.len(), "Bridge running");

    let stopped = match args.duration {
        Some(duration) => {
            tokio::select! {
                () = tokio::time::sleep(duration) => Ok(()),
                signal = tokio::signal::ctrl_c() => signal,
            }
        }
        None => tokio::signal::ctrl_c().await,
    };

    tasks.abort_all();
    gateway.shutdown().await;
    info!("Bridge stopped");
    stopped.map_err(CliError::from)
}
