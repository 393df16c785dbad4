//! Fatal error kinds raised by the partitioning, balancing and packing layers.
//!
//! All of them are fatal: they propagate to the driver and terminate the run.

use std::error::Error;
use std::fmt;

/// An enumerated type for the fatal error kinds of the task layer.
#[derive(Debug, Clone, PartialEq)]
pub enum XcTaskError {
    /// An invalid run configuration (rank or lane count, execution space, strategy, padding
    /// factor), detected before any task is built.
    Configuration(String),

    /// A breach of the screening data model: a significant shell without functions, or an
    /// unsorted or duplicated shell list.
    ScreeningInconsistency {
        /// The index of the offending task, if known.
        task: Option<usize>,

        /// The offending shell index, if a single shell is at fault.
        shell: Option<usize>,

        /// Description of the breach.
        reason: String,
    },

    /// A submatrix cut reaching outside the global matrix.
    PackingBounds {
        /// The index of the offending task, if known.
        task: Option<usize>,

        /// The index of the offending cut within its task.
        cut: usize,

        /// The global offset of the offending cut.
        global_offset: usize,

        /// The extent of the offending cut.
        extent: usize,

        /// The dimension of the global matrix along the cut.
        global_dim: usize,
    },

    /// An empty task set, or a task set that does not cover the grid exactly once.
    BalanceInput(String),
}

impl XcTaskError {
    /// Attaches a task index to errors that carry one.
    pub fn with_task(self, itask: usize) -> Self {
        match self {
            Self::ScreeningInconsistency { shell, reason, .. } => Self::ScreeningInconsistency {
                task: Some(itask),
                shell,
                reason,
            },
            Self::PackingBounds {
                cut,
                global_offset,
                extent,
                global_dim,
                ..
            } => Self::PackingBounds {
                task: Some(itask),
                cut,
                global_offset,
                extent,
                global_dim,
            },
            other => other,
        }
    }
}

impl fmt::Display for XcTaskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Configuration error: {msg}."),
            Self::ScreeningInconsistency {
                task,
                shell,
                reason,
            } => {
                write!(f, "Screening inconsistency")?;
                if let Some(itask) = task {
                    write!(f, " in task {itask}")?;
                }
                if let Some(ishell) = shell {
                    write!(f, " at shell {ishell}")?;
                }
                write!(f, ": {reason}.")
            }
            Self::PackingBounds {
                task,
                cut,
                global_offset,
                extent,
                global_dim,
            } => {
                write!(f, "Packing bounds error")?;
                if let Some(itask) = task {
                    write!(f, " in task {itask}")?;
                }
                write!(
                    f,
                    ": cut {cut} spans [{global_offset}, {}) but the global dimension is {global_dim}.",
                    global_offset + extent
                )
            }
            Self::BalanceInput(msg) => write!(f, "Balance input error: {msg}."),
        }
    }
}

impl Error for XcTaskError {}
