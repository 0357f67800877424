//! Command-line configuration of the `interactive_cli` binary and logging setup.

use anyhow::{Context, Result, anyhow};
use argh::FromArgs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs, Debug, PartialEq)]
/// Read `command key=value ...` lines and run the matching commands.
pub struct CliArgs {
    #[argh(switch, long = "async")]
    /// run the input loop on a background thread and wait for it to finish.
    pub run_async: bool,

    #[argh(option)]
    /// file whose lines are executed as commands before reading input.
    pub script: Option<PathBuf>,

    #[argh(switch)]
    /// echo the lines of --script as they are executed.
    pub print_lines: bool,

    #[argh(option, default = "String::from(\"> \")")]
    /// prompt shown when reading from a terminal.
    pub prompt: String,

    #[argh(option, default = "String::from(\"warn\")")]
    /// log filter used when RUST_LOG is not set, e.g. "debug" or "interactive_cli=trace".
    pub log_filter: String,
}

/// Install a stderr log subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("invalid log filter: {}", default_filter))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {}", err))
}
