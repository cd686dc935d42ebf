//! CLI argument definitions for snapline.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Run the prefetch scheduler until Ctrl-C |
//! | `fetch` | Resolve one fact through the fallback chain |
//! | `refresh` | Refresh one endpoint once |
//! | `config` | Print the effective configuration |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | TOML configuration file |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--log-json` | `false` | Emit logs as JSON lines |
//!
//! # Examples
//!
//! ```bash
//! snapline run --config snapline.toml
//! snapline fetch --entity 4034 --position RB --rank 1 --season 2024 --week 8 --kind snap_pct
//! snapline refresh injuries --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Resilient fetch and cache layer for league and stats upstreams.
#[derive(Debug, Parser)]
#[command(name = "snapline", author, version, about)]
pub struct Cli {
    /// TOML configuration file, layered over the defaults.
    #[arg(long, global = true, env = "SNAPLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the prefetch scheduler until interrupted.
    Run(RunArgs),

    /// Resolve one fact: exact period, prior period, then estimate.
    ///
    /// # Examples
    ///
    ///   snapline fetch --entity 4034 --position RB --rank 1 --season 2024 --week 8 --kind snap_pct
    ///   snapline fetch --entity KC --season 2024 --week 8 --kind schedule --no-prefetch
    Fetch(FetchArgs),

    /// Refresh one endpoint now and print what was written.
    Refresh(RefreshArgs),

    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run a single cycle and exit.
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Player id or team abbreviation.
    #[arg(long)]
    pub entity: String,

    /// Roster position (QB, RB, WR, TE, K, DEF).
    #[arg(long, default_value = "OTHER")]
    pub position: String,

    /// Depth-chart rank, used by the estimate tier.
    #[arg(long)]
    pub rank: Option<u8>,

    #[arg(long)]
    pub season: u16,

    #[arg(long)]
    pub week: u8,

    /// schedule, snap_pct, practice_status or usage.
    #[arg(long)]
    pub kind: String,

    /// Skip the prefetch cycle normally run before resolving.
    #[arg(long, default_value_t = false)]
    pub no_prefetch: bool,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Endpoint key, e.g. `snap-counts`.
    pub endpoint: String,
}
