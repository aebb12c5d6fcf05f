//! Command-line argument parsing.

use clap::Parser;

/// Shelfwire - Live dashboard channel and smart search client for the
/// library server
#[derive(Parser, Debug)]
#[command(name = "shelfwire")]
#[command(version)]
#[command(
    about = "Live dashboard channel and smart search client for the library server",
    long_about = None
)]
pub struct Args {
    /// Run one smart search from the command line and print the merged
    /// suggestions instead of watching live events
    #[arg(short, long)]
    pub search: Option<String>,

    /// Skip AI hints when searching
    #[arg(long)]
    pub no_ai: bool,

    /// Server base URL (overrides settings.conf)
    #[arg(long)]
    pub server: Option<String>,

    /// Specify the configuration directory (default: ~/.config/shelfwire)
    #[arg(long)]
    pub config_dir: Option<String>,

    /// Write the log to this file (default: <config-dir>/logs/shelfwire.log)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Set the logging level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output (equivalent to --log-level debug)
    #[arg(short, long)]
    pub verbose: bool,
}

/// The effective log level, with `--verbose` taking precedence.
#[must_use]
pub fn determine_log_level(args: &Args) -> &str {
    if args.verbose { "debug" } else { &args.log_level }
}
