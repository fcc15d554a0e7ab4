//! Clap derive structures for the `sonofly` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sonofly -- local-first control of Sonoff/eWeLink devices
#[derive(Debug, Parser)]
#[command(
    name = "sonofly",
    version,
    about = "Control Sonoff/eWeLink devices over LAN and cloud",
    long_about = "Connects one or more eWeLink accounts, keeps a cached device list per\n\
        account, and delivers commands over the LAN when a device is reachable,\n\
        falling back to the cloud otherwise.",
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
    /// Config file (defaults to the platform config dir)
    #[arg(long, short = 'C', env = "SONOFLY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Restrict to one configured account
    #[arg(long, short = 'a', env = "SONOFLY_ACCOUNT", global = true)]
    pub account: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SONOFLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides config)
    #[arg(long, env = "SONOFLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

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

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bring every account online and serve commands until interrupted
    Run(RunArgs),

    /// Send one command to a device or camera
    #[command(alias = "s")]
    Send(SendArgs),

    /// List known devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not read JSON-line commands from stdin
    #[arg(long)]
    pub no_stdin: bool,
}

// ── Send ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Device id (10 characters) or camera id (6 characters)
    pub device: String,

    /// LAN command name, or the camera command
    #[arg(long)]
    pub cmd: Option<String>,

    /// Parameter as key=value; values are parsed as JSON when possible
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Full parameter object as JSON
    #[arg(long, conflicts_with = "params")]
    pub json: Option<String>,

    /// Seconds to wait for account setup before sending
    #[arg(long, default_value = "15")]
    pub wait: u64,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Connect and list live state instead of the cached lists
    #[arg(long)]
    pub live: bool,
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

    /// Display the resolved configuration with secrets masked
    Show,

    /// Import the account from a legacy YAML file
    Import {
        /// Legacy file (defaults to legacy.yaml in the config dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Store an account password in the system keyring
    SetPassword {
        /// Account name
        account: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
