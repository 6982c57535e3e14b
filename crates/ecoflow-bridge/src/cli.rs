//! Clap derive structures for the `ecoflow` CLI.
//!
//! Defines the command tree, global flags, and shared argument types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ecoflow_core::DeviceModel;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ecoflow -- bridge EcoFlow devices from the command line
#[derive(Debug, Parser)]
#[command(
    name = "ecoflow",
    version,
    about = "Monitor and control EcoFlow devices through the EcoFlow cloud",
    long_about = "Talks to EcoFlow power stations, smart plugs and appliances through\n\
        the EcoFlow developer API and its MQTT broker.\n\n\
        Devices come from the config file; ad-hoc devices can be addressed by\n\
        serial number together with --model and credentials.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "ECOFLOW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// EcoFlow API base URL (overrides config)
    #[arg(long, env = "ECOFLOW_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Developer access key for ad-hoc devices
    #[arg(long, env = "ECOFLOW_ACCESS_KEY", global = true, hide_env = true)]
    pub access_key: Option<String>,

    /// Developer secret key for ad-hoc devices
    #[arg(long, env = "ECOFLOW_SECRET_KEY", global = true, hide_env = true)]
    pub secret_key: Option<String>,

    /// Wait this long for a set reply ("2s", "500ms")
    #[arg(long, env = "ECOFLOW_REPLY_TIMEOUT", value_parser = humantime::parse_duration, global = true)]
    pub reply_timeout: Option<Duration>,

    /// Use in-process simulated devices instead of the EcoFlow cloud
    #[arg(long, env = "ECOFLOW_SIMULATE", global = true)]
    pub simulate: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ECOFLOW_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured devices and supported models
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Show the decoded status of a device
    #[command(alias = "st")]
    Status(TargetArgs),

    /// Dump the raw quota snapshot of a device
    Quotas(TargetArgs),

    /// Send a set command to a device
    Set(SetArgs),

    /// Subscribe to devices and print updates until interrupted
    Run(RunArgs),

    /// Manage the configuration file and stored secrets
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices from the config file
    #[command(alias = "ls")]
    List,

    /// List supported device models and their product lines
    Models,
}

// ── Device targeting ─────────────────────────────────────────────────

/// A configured device by name or serial number, or an ad-hoc serial
/// number when `--model` is given.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Device name or serial number
    pub device: String,

    /// Model of an ad-hoc device not in the config file
    #[arg(long, short = 'm')]
    pub model: Option<DeviceModel>,
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Setting to change
    pub setting: Setting,

    /// New value ("on"/"off", a number, or a supply priority)
    pub value: String,

    /// Send through the HTTP API instead of MQTT
    #[arg(long)]
    pub http: bool,

    /// Keep the optimistic state when the command fails
    #[arg(long)]
    pub no_revert: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Setting {
    /// AC output on/off
    Ac,
    /// X-Boost on/off
    Xboost,
    /// 12 V DC output on/off
    Dc,
    /// USB output on/off
    Usb,
    /// Smart plug relay on/off
    Switch,
    /// Display or LED brightness, percent
    Brightness,
    /// Maximum state of charge, percent
    ChargeLimit,
    /// Minimum state of charge, percent
    DischargeLimit,
    /// AC charging power, watts
    AcChargingPower,
    /// PowerStream permanent output, watts
    PowerDemand,
    /// PowerStream supply priority ("supply" or "storage")
    SupplyPriority,
    /// Target temperature, °C
    TargetTemperature,
    /// Eco mode on/off
    EcoMode,
    /// Fan speed level
    FanSpeed,
    /// Operating mode number
    Mode,
    /// Main power on/off
    Power,
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Devices to bridge (default: every configured device)
    pub devices: Vec<String>,

    /// Model of ad-hoc devices not in the config file
    #[arg(long, short = 'm')]
    pub model: Option<DeviceModel>,

    /// Stop after this long instead of waiting for Ctrl-C
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Print every raw quota message as well
    #[arg(long)]
    pub raw: bool,

    /// Quota report interval of simulated devices
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub sim_interval: Duration,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the resolved configuration (secrets redacted)
    Show,

    /// Add a device to the config file
    AddDevice {
        /// Display name
        name: String,

        /// Serial number
        serial_number: String,

        /// Model ("delta2", "Smart Plug", ...)
        model: DeviceModel,

        /// Developer access key
        #[arg(value_name = "ACCESS_KEY")]
        key: String,

        /// Store the secret key in plaintext (prefer set-secret)
        #[arg(long)]
        plaintext_secret: Option<String>,

        /// Read the secret key from this environment variable
        #[arg(long, value_name = "VAR")]
        secret_env: Option<String>,
    },

    /// Remove a device from the config file
    RemoveDevice {
        /// Device name or serial number
        device: String,
    },

    /// Store a secret key in the system keyring
    SetSecret {
        /// Access key the secret belongs to
        #[arg(value_name = "ACCESS_KEY")]
        key: String,

        /// Secret key
        #[arg(long, env = "ECOFLOW_NEW_SECRET_KEY", hide_env = true)]
        secret: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
