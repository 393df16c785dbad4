//! Quadrature tasks: point batches with their screened basis-function footprint.

use std::fmt;

use anyhow::{self, ensure, format_err};
use approx;
use itertools::Itertools;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::XcTaskError;
use crate::screening::{BoundingBox, ShellScreening};
use crate::submatrix::SubmatrixCut;

pub mod partition;


// ==================
// Struct definitions
// ==================

// ----------
// PointRange
// ----------

/// A half-open range of valid points in the partitioned point ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRange {
    /// The position of the first point.
    pub offset: usize,

    /// The number of points.
    pub len: usize,
}

impl PointRange {
    /// One past the last position.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

// ----
// Task
// ----

/// A unit of grid work: a batch of quadrature points on one atom, padded to a multiple of the
/// padding factor, together with the shells significant for it and the submatrix cuts of those
/// shells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// The index of the atom whose grid this batch comes from.
    pub parent: usize,

    /// The distance from the parent atom to its nearest neighbour.
    pub dist_nearest: f64,

    /// The valid points of this batch in the partitioned point ordering.
    pub range: PointRange,

    /// The padded number of points, a multiple of the padding factor.
    pub npts: usize,

    /// The quadrature points, including padding. Empty when stripped.
    pub points: Vec<Point3<f64>>,

    /// The raw quadrature weights, including zero padding weights. Empty when stripped.
    pub weights: Vec<f64>,

    /// The bounding box of the valid points.
    pub bbox: BoundingBox,

    /// The significant shells for this batch.
    pub screening: ShellScreening,

    /// The submatrix cuts of the significant shells.
    pub cuts: Vec<SubmatrixCut>,
}

impl Task {
    /// The number of significant basis functions.
    pub fn nbe(&self) -> usize {
        self.screening.nbe
    }

    /// The significant shells as strictly increasing global shell indices.
    pub fn shell_list(&self) -> &[usize] {
        &self.screening.shell_list
    }

    /// The number of valid (unpadded) points.
    pub fn n_valid(&self) -> usize {
        self.range.len
    }

    /// The number of padding points.
    pub fn n_padding(&self) -> usize {
        self.npts - self.range.len
    }

    /// The valid points. Empty when stripped.
    pub fn valid_points(&self) -> &[Point3<f64>] {
        &self.points[..self.range.len.min(self.points.len())]
    }

    /// The valid raw weights. Empty when stripped.
    pub fn valid_weights(&self) -> &[f64] {
        &self.weights[..self.range.len.min(self.weights.len())]
    }

    /// Checks if the points and weights of this task have been stripped.
    pub fn is_stripped(&self) -> bool {
        self.points.is_empty() && self.weights.is_empty()
    }

    /// Drops the points and weights of this task for compact persistence.
    pub fn strip_points(&mut self) -> &mut Self {
        self.points = vec![];
        self.weights = vec![];
        self
    }

    /// Returns a copy of this task without points and weights.
    pub fn stripped(&self) -> Self {
        let mut task = self.clone();
        task.strip_points();
        task
    }

    /// Verifies the padding invariants: `npts` and the point and weight counts are multiples of
    /// `pv`, and padding weights are zero.
    pub fn check_padding(&self, pv: usize) -> Result<(), XcTaskError> {
        if pv == 0 {
            return Err(XcTaskError::Configuration(
                "padding factor must be positive".to_string(),
            ));
        }
        let inconsistent = |reason: String| XcTaskError::ScreeningInconsistency {
            task: None,
            shell: None,
            reason,
        };
        if self.npts % pv != 0 || self.npts < self.range.len {
            return Err(inconsistent(format!(
                "npts = {} is not a padded count of {} valid points for pv = {pv}",
                self.npts, self.range.len
            )));
        }
        if !self.is_stripped() {
            if self.points.len() != self.npts || self.weights.len() != self.npts {
                return Err(inconsistent(format!(
                    "{} points and {} weights for npts = {}",
                    self.points.len(),
                    self.weights.len(),
                    self.npts
                )));
            }
            if self.weights[self.range.len..].iter().any(|w| *w != 0.0) {
                return Err(inconsistent("non-zero padding weight".to_string()));
            }
        }
        Ok(())
    }

    /// Compares this task against a reference task.
    ///
    /// The parent index, `npts`, shell list, `nbe` and cuts must be identical, and the
    /// nearest-neighbour distance equal within `thresh`. If the reference has been stripped, the
    /// point and weight counts of this task are checked against `npts`; otherwise points and
    /// weights are compared component-wise within `thresh`.
    pub fn matches_reference(&self, reference: &Task, thresh: f64) -> Result<(), anyhow::Error> {
        ensure!(
            self.parent == reference.parent,
            "Parent mismatch: {} vs. reference {}.",
            self.parent,
            reference.parent
        );
        ensure!(
            approx::relative_eq!(
                self.dist_nearest,
                reference.dist_nearest,
                epsilon = thresh,
                max_relative = thresh
            ),
            "Nearest-neighbour distance mismatch: {} vs. reference {}.",
            self.dist_nearest,
            reference.dist_nearest
        );
        ensure!(
            self.npts == reference.npts,
            "npts mismatch: {} vs. reference {}.",
            self.npts,
            reference.npts
        );
        ensure!(
            self.shell_list() == reference.shell_list(),
            "Shell list mismatch: [{}] vs. reference [{}].",
            self.shell_list().iter().join(", "),
            reference.shell_list().iter().join(", ")
        );
        ensure!(
            self.nbe() == reference.nbe(),
            "nbe mismatch: {} vs. reference {}.",
            self.nbe(),
            reference.nbe()
        );
        ensure!(
            self.cuts == reference.cuts,
            "Submatrix cut mismatch: [{}] vs. reference [{}].",
            self.cuts.iter().join(", "),
            reference.cuts.iter().join(", ")
        );
        if reference.is_stripped() {
            ensure!(
                self.points.len() == self.npts && self.weights.len() == self.npts,
                "{} points and {} weights for npts = {}.",
                self.points.len(),
                self.weights.len(),
                self.npts
            );
        } else {
            ensure!(
                self.points.len() == reference.points.len()
                    && self.weights.len() == reference.weights.len(),
                "Point or weight count mismatch with the reference."
            );
            let points_match = self
                .points
                .iter()
                .zip(reference.points.iter())
                .all(|(p, q)| approx::relative_eq!(p, q, epsilon = thresh, max_relative = thresh));
            ensure!(points_match, "Point coordinates mismatch with the reference.");
            let weights_match = self
                .weights
                .iter()
                .zip(reference.weights.iter())
                .all(|(w, v)| approx::relative_eq!(w, v, epsilon = thresh, max_relative = thresh));
            ensure!(weights_match, "Weight mismatch with the reference.");
        }
        Ok(())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task(parent = {}, points = [{}, {}) + {} padding, nbe = {}, ncut = {})",
            self.parent,
            self.range.offset,
            self.range.end(),
            self.n_padding(),
            self.nbe(),
            self.cuts.len()
        )
    }
}

// -------
// TaskSet
// -------

/// The complete outcome of partitioning a molecular grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSet {
    /// The padding factor used.
    pub pv: usize,

    /// The tasks, in partition order.
    pub tasks: Vec<Task>,

    /// The point ranges of batches dropped because no shell was significant for them.
    pub pruned: Vec<PointRange>,

    /// For each position in the partitioned point ordering, the index of that point in the
    /// atom-major concatenation of the raw atomic grids.
    pub permutation: Vec<usize>,
}

impl TaskSet {
    /// The number of grid points covered by this task set.
    pub fn n_points(&self) -> usize {
        self.permutation.len()
    }

    /// The number of tasks.
    pub fn n_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// The total padded point count across tasks.
    pub fn total_npts(&self) -> usize {
        self.tasks.iter().map(|task| task.npts).sum()
    }

    /// Verifies that the tasks and pruned batches cover every grid point exactly once: their
    /// point ranges tile `[0, n_points)` and the permutation is a bijection.
    pub fn validate_coverage(&self) -> Result<(), XcTaskError> {
        let ranges = self
            .tasks
            .iter()
            .map(|task| task.range)
            .chain(self.pruned.iter().copied())
            .sorted_by_key(|range| range.offset)
            .collect_vec();
        let mut next = 0;
        for range in ranges.iter() {
            if range.len == 0 {
                return Err(XcTaskError::BalanceInput(format!(
                    "empty point range at offset {}",
                    range.offset
                )));
            }
            if range.offset != next {
                return Err(XcTaskError::BalanceInput(format!(
                    "point range [{}, {}) does not follow position {next}",
                    range.offset,
                    range.end()
                )));
            }
            next = range.end();
        }
        if next != self.n_points() {
            return Err(XcTaskError::BalanceInput(format!(
                "tasks cover {next} points of a {}-point grid",
                self.n_points()
            )));
        }
        let mut seen = vec![false; self.n_points()];
        for &iorig in self.permutation.iter() {
            match seen.get_mut(iorig) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(XcTaskError::BalanceInput(format!(
                        "grid point {iorig} is missing or claimed twice"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Verifies the padding invariants of every task.
    pub fn check_padding(&self) -> Result<(), XcTaskError> {
        self.tasks
            .iter()
            .enumerate()
            .try_for_each(|(itask, task)| {
                task.check_padding(self.pv)
                    .map_err(|err| err.with_task(itask))
            })
    }

    /// Returns the tasks at the given indices with points and weights stripped.
    pub fn stripped_tasks(&self, indices: &[usize]) -> Result<Vec<Task>, anyhow::Error> {
        indices
            .iter()
            .map(|&itask| {
                self.tasks
                    .get(itask)
                    .map(|task| task.stripped())
                    .ok_or_else(|| format_err!("Task index {itask} out of range."))
            })
            .collect()
    }
}

impl fmt::Display for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nbes = self.tasks.iter().map(|task| task.nbe()).collect_vec();
        writeln!(f, "Padding factor: {}", self.pv)?;
        writeln!(f, "Grid points: {}", self.n_points())?;
        writeln!(
            f,
            "Tasks: {} ({} padded points)",
            self.n_tasks(),
            self.total_npts()
        )?;
        writeln!(
            f,
            "Pruned batches: {} ({} points)",
            self.pruned.len(),
            self.pruned.iter().map(|range| range.len).sum::<usize>()
        )?;
        if let (Some(min), Some(max)) = (nbes.iter().min(), nbes.iter().max()) {
            writeln!(f, "nbe per task: {min} to {max}")?;
        }
        Ok(())
    }
}
