//! Main-output formatting: the stage banners, reports and value renderings of an xctask run.

use std::fmt;
use std::time::Duration;

use log;

use crate::io::XcTaskFileType;

#[cfg(test)]
#[path = "format_tests.rs"]
mod format_tests;

/// Width of every banner line of the main output.
const XCTASK_BANNER_LENGTH: usize = 103;

/// Logs an error to both the diagnostic log and the `xctask-output` logger.
macro_rules! xctask_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "xctask-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a warning to the `xctask-output` logger.
macro_rules! xctask_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "xctask-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `xctask-output` logger.
macro_rules! xctask_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "xctask-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {xctask_error, xctask_output, xctask_warn};

// ======
// Stages
// ======

/// The stages of an xctask run, each of which opens its own section of the main output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Partitioning of the molecular grid into screened tasks and balancing them over ranks.
    GridPartitioning,

    /// Integration of the Slater exchange over the local tasks of every rank.
    ExchangeIntegration,
}

impl Stage {
    /// The title of the stage banner.
    pub(crate) fn title(&self) -> &'static str {
        match self {
            Stage::GridPartitioning => "Grid Partitioning",
            Stage::ExchangeIntegration => "Exchange Integration",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::GridPartitioning => write!(f, "Grid partitioning"),
            Stage::ExchangeIntegration => write!(f, "Exchange integration"),
        }
    }
}

/// The three lines of the boxed banner of a stage driver.
fn stage_banner(stage: Stage) -> [String; 3] {
    let title = stage.title();
    let length = XCTASK_BANNER_LENGTH - 6;
    let bar = "─".repeat(length);
    [
        format!("┌──{bar}──┐"),
        format!("│§ {title:^length$} §│"),
        format!("└──{bar}──┘"),
    ]
}

/// The line delimiting the beginning of a stage as seen from the input handler, or its end
/// together with the wall time it took.
fn stage_delimiter(stage: Stage, elapsed: Option<Duration>) -> String {
    let width = XCTASK_BANNER_LENGTH - 14;
    match elapsed {
        None => {
            let label = format!("{stage} ");
            format!("❬❬❬❬❬ [Begin] {label:❬<width$}")
        }
        Some(elapsed) => {
            let label = format!("{stage} ({:.3} s) ", elapsed.as_secs_f64());
            format!("❭❭❭❭❭ [ End ] {label:❭<width$}")
        }
    }
}

/// Logs the boxed banner a stage driver opens its output with.
pub(crate) fn log_stage_title(stage: Stage) {
    for line in stage_banner(stage).iter() {
        xctask_output!("{line}");
    }
    xctask_output!("");
}

/// Logs the beginning of a stage.
pub(crate) fn log_stage_begin(stage: Stage) {
    xctask_output!("{}", stage_delimiter(stage, None));
    xctask_output!("");
}

/// Logs the end of a stage and the wall time it took.
pub(crate) fn log_stage_end(stage: Stage, elapsed: Duration) {
    xctask_output!("{}", stage_delimiter(stage, Some(elapsed)));
    xctask_output!("");
}

// =======
// Reports
// =======

/// Logs a subtitle underlined to its own width.
pub(crate) fn log_subtitle(subtitle: &str) {
    xctask_output!("{subtitle}");
    xctask_output!("{}", "═".repeat(subtitle.chars().count()));
}

/// Logs a report: a subtitle followed by the display of `content`, set off by blank lines.
pub(crate) fn log_report<T: XcTaskOutput>(subtitle: &str, content: &T) {
    log_subtitle(subtitle);
    xctask_output!("");
    content.log_output_display();
    xctask_output!("");
}

/// Renders a boolean parameter as `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b { "yes" } else { "no" }.to_string()
}

/// Renders where a result is saved: the file name with the extension of `file_type`, or `no`.
pub(crate) fn nice_save_target(name: Option<&String>, file_type: XcTaskFileType) -> String {
    name.map(|name| file_type.path_for(name).display().to_string())
        .unwrap_or_else(|| nice_bool(false))
}

/// Display output that is logged line by line to the `xctask-output` logger.
pub(crate) trait XcTaskOutput: fmt::Debug + fmt::Display {
    fn log_output_display(&self) {
        self.to_string().lines().for_each(|line| {
            xctask_output!("{line}");
        })
    }
}

impl<T> XcTaskOutput for T where T: fmt::Debug + fmt::Display {}
