use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Debug, Subcommand, PartialEq)]
pub(crate) enum Command {
    /// Print input events of the demo controller.
    Watch {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Record the range of every control and print it.
    Calibrate {
        /// How long to record
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
    },
    /// Wait for a control to be pressed and released.
    Identify {
        /// Give up after this many milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
}

/// Polls a controller, shapes its values and reports input events.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Turn debugging information on
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Directory with saved configurations
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Polling period in milliseconds
    #[arg(long, default_value_t = 10)]
    pub period_ms: u64,

    /// The command to run
    #[clap(subcommand)]
    pub command: Command,
}
