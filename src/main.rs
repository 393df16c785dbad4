use std::path::Path;
use std::process;

use anyhow::{self, format_err, Context};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use xctask::interfaces::cli::{log_heading, Cli};
use xctask::interfaces::input::Input;
use xctask::interfaces::InputHandle;
use xctask::io::read_xctask_yaml;

/// Configures `log4rs` with the main output on the `xctask-output` target and diagnostics on
/// standard error.
fn init_logging(output: Option<&Path>, verbose: u8) -> Result<(), anyhow::Error> {
    let output_encoder = Box::new(PatternEncoder::new("{m}{n}"));
    let output_appender: Box<dyn Append> = match output {
        Some(path) => Box::new(
            FileAppender::builder()
                .encoder(output_encoder)
                .append(false)
                .build(path)
                .with_context(|| format!("Unable to open output file {}", path.display()))?,
        ),
        None => Box::new(ConsoleAppender::builder().encoder(output_encoder).build()),
    };
    let diagnostics_appender = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {t} - {m}{n}",
        )))
        .target(Target::Stderr)
        .build();
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let config = Config::builder()
        .appender(Appender::builder().build("output", output_appender))
        .appender(Appender::builder().build("diagnostics", Box::new(diagnostics_appender)))
        .logger(
            Logger::builder()
                .appender("output")
                .additive(false)
                .build("xctask-output", LevelFilter::Info),
        )
        .build(Root::builder().appender("diagnostics").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    init_logging(cli.output.as_deref(), cli.verbose)?;
    log_heading();
    let config = cli
        .config
        .as_ref()
        .ok_or_else(|| format_err!("No input configuration file specified."))?;
    let input = read_xctask_yaml::<Input, _>(config)
        .with_context(|| format!("Unable to read input configuration {}", config.display()))?;
    input.handle()
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        log::error!(target: "xctask-output", "{err:?}");
        eprintln!("Error: {err:?}");
        process::exit(1);
    }
}
