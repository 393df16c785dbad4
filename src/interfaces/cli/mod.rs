use std::path::PathBuf;

use clap::Parser;

use crate::io::format::xctask_output;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted xctask heading to the `xctask-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    xctask_output!("╭─────────────────────────────────────────────────────────────────────────────────────────────────────╮");
    xctask_output!("│                                                                                                     │");
    xctask_output!("│       ██╗  ██╗ ██████╗████████╗ █████╗ ███████╗██╗  ██╗                                             │");
    xctask_output!("│       ╚██╗██╔╝██╔════╝╚══██╔══╝██╔══██╗██╔════╝██║ ██╔╝                                             │");
    xctask_output!("│        ╚███╔╝ ██║        ██║   ███████║███████╗█████╔╝                                              │");
    xctask_output!("│        ██╔██╗ ██║        ██║   ██╔══██║╚════██║██╔═██╗                                              │");
    xctask_output!("│       ██╔╝ ██╗╚██████╗   ██║   ██║  ██║███████║██║  ██╗                                             │");
    xctask_output!("│       ╚═╝  ╚═╝ ╚═════╝   ╚═╝   ╚═╝  ╚═╝╚══════╝╚═╝  ╚═╝                                             │");
    xctask_output!("│                                                                                                     │");
    xctask_output!("│       Grid task partitioning, load balancing and submatrix packing                                  │");
    xctask_output!("│       for numerical exchange-correlation integration                                                │");
    xctask_output!("│                                                                                       {version:>13} │");
    xctask_output!("╰─────────────────────────────────────────────────────────────────────────────────────────────────────╯");
    xctask_output!("");
}

/// Command-line arguments of the `xctask` binary.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// The YAML input file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The file the main output is written to. If absent, the output goes to the console.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Increases the verbosity of diagnostic logging on standard error. May be repeated.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
