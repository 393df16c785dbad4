//! Partitioning of a molecular grid into padded, screened tasks.

use std::fmt;

use derive_builder::Builder;
use itertools::Itertools;
use log;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::basis::shell::BasisSet;
use crate::error::XcTaskError;
use crate::grid::{AtomicGrid, MolecularGrid};
use crate::io::format::nice_bool;
use crate::screening::{screen, BoundingBox};
use crate::submatrix::{build_cuts, validate_cuts};
use crate::task::{PointRange, Task, TaskSet};

#[cfg(test)]
#[path = "partition_tests.rs"]
mod partition_tests;

/// Boxes with no edge longer than this are not subdivided further.
const DEGENERATE_BOX_EXTENT: f64 = 1e-12;

// ==================
// Struct definitions
// ==================

/// A structure containing control parameters for grid partitioning.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionParams {
    /// The padding factor: the padded point count of every task is a multiple of this.
    #[builder(default = "1")]
    pub pv: usize,

    /// The largest number of valid points in a batch, unless its points cannot be separated.
    #[builder(default = "512")]
    pub max_batch_size: usize,

    /// Boolean indicating if batches without significant shells are dropped from the task set.
    /// Dropped batches are still recorded for coverage checks.
    #[builder(default = "true")]
    pub prune_empty: bool,
}

impl PartitionParams {
    /// Returns a builder to construct a [`PartitionParams`] structure.
    pub fn builder() -> PartitionParamsBuilder {
        PartitionParamsBuilder::default()
    }

    /// Verifies that the parameters describe a valid partitioning.
    pub fn validate(&self) -> Result<(), XcTaskError> {
        if self.pv == 0 {
            return Err(XcTaskError::Configuration(
                "padding factor must be at least 1".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(XcTaskError::Configuration(
                "maximum batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PartitionParams {
    fn default() -> Self {
        PartitionParams::builder()
            .build()
            .expect("Unable to construct a default `PartitionParams`.")
    }
}

impl fmt::Display for PartitionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Padding factor (pv): {}", self.pv)?;
        writeln!(f, "Maximum batch size: {}", self.max_batch_size)?;
        writeln!(f, "Prune empty batches: {}", nice_bool(self.prune_empty))?;
        Ok(())
    }
}

/// The partitioning of a single atomic grid, with point ranges relative to that grid.
#[derive(Clone, Debug)]
pub(crate) struct AtomPartition {
    /// The tasks on this atom, with offsets relative to the first point of the atom.
    pub(crate) tasks: Vec<Task>,

    /// The pruned ranges on this atom, relative to the first point of the atom.
    pub(crate) pruned: Vec<PointRange>,

    /// The order in which the atom's raw points appear in the partitioned ordering.
    pub(crate) order: Vec<usize>,
}

// =========
// Functions
// =========

/// Splits points into octree leaves of at most `max_batch_size` points.
///
/// The bounding box of a node is split at its centre into eight octants visited in a fixed
/// order (x-major, then y, then z, lower half first). Points keep their relative order within
/// each leaf. A node whose box has degenerated is a leaf regardless of its size, and so is a
/// node whose split would leave all of its points in one octant, which happens when its extent
/// is down to a few ulps.
///
/// # Returns
///
/// The leaves as vectors of indices into `points`.
pub fn octree_batches(points: &[Point3<f64>], max_batch_size: usize) -> Vec<Vec<usize>> {
    let mut leaves = vec![];
    let indices = (0..points.len()).collect_vec();
    split_node(points, indices, max_batch_size.max(1), &mut leaves);
    leaves
}

fn split_node(
    points: &[Point3<f64>],
    indices: Vec<usize>,
    max_batch_size: usize,
    leaves: &mut Vec<Vec<usize>>,
) {
    if indices.is_empty() {
        return;
    }
    let node_points = indices.iter().map(|&i| points[i]).collect_vec();
    let bbox = match BoundingBox::from_points(&node_points) {
        Some(bbox) => bbox,
        None => return,
    };
    if indices.len() <= max_batch_size || bbox.max_extent() < DEGENERATE_BOX_EXTENT {
        leaves.push(indices);
        return;
    }
    let center = bbox.center();
    let n_points = indices.len();
    let mut octants: [Vec<usize>; 8] = Default::default();
    for i in indices {
        let p = &points[i];
        let octant = (usize::from(p.x >= center.x) << 2)
            | (usize::from(p.y >= center.y) << 1)
            | usize::from(p.z >= center.z);
        octants[octant].push(i);
    }
    if let Some(unsplit) = octants.iter_mut().find(|octant| octant.len() == n_points) {
        leaves.push(std::mem::take(unsplit));
        return;
    }
    for octant in octants {
        split_node(points, octant, max_batch_size, leaves);
    }
}

/// Builds a task from the valid points of a batch: pads the batch to a multiple of `pv` with
/// zero-weight copies of its last point, screens it and builds its cuts.
///
/// # Arguments
///
/// * `parent` - The parent atom index.
/// * `dist_nearest` - The nearest-neighbour distance of the parent atom.
/// * `offset` - The position of the first valid point in the partitioned ordering.
/// * `points` - The valid points. Must not be empty.
/// * `weights` - The raw weights of the valid points.
/// * `basis` - The basis set to screen against.
/// * `pv` - The padding factor.
pub fn build_task(
    parent: usize,
    dist_nearest: f64,
    offset: usize,
    mut points: Vec<Point3<f64>>,
    mut weights: Vec<f64>,
    basis: &BasisSet,
    pv: usize,
) -> Result<Task, XcTaskError> {
    if pv == 0 {
        return Err(XcTaskError::Configuration(
            "padding factor must be at least 1".to_string(),
        ));
    }
    let n_valid = points.len();
    let bbox = BoundingBox::from_points(&points).ok_or_else(|| {
        XcTaskError::BalanceInput(format!("empty batch at offset {offset} on atom {parent}"))
    })?;
    if weights.len() != n_valid {
        return Err(XcTaskError::BalanceInput(format!(
            "{} weights for {n_valid} points at offset {offset} on atom {parent}",
            weights.len()
        )));
    }

    let screening = screen(&points, basis);
    screening.validate(basis)?;
    let cuts = build_cuts(&screening.shell_list, basis);
    validate_cuts(&cuts, screening.nbe)?;

    let npts = (n_valid + pv - 1) / pv * pv;
    let last = points[n_valid - 1];
    points.resize(npts, last);
    weights.resize(npts, 0.0);

    Ok(Task {
        parent,
        dist_nearest,
        range: PointRange {
            offset,
            len: n_valid,
        },
        npts,
        points,
        weights,
        bbox,
        screening,
        cuts,
    })
}

/// Partitions one atomic grid. Point ranges are relative to the first point of the atom.
pub(crate) fn partition_atom(
    parent: usize,
    atomic_grid: &AtomicGrid,
    dist_nearest: f64,
    basis: &BasisSet,
    params: &PartitionParams,
) -> Result<AtomPartition, XcTaskError> {
    let leaves = octree_batches(&atomic_grid.points, params.max_batch_size);
    let mut tasks = vec![];
    let mut pruned = vec![];
    let mut offset = 0;
    for leaf in leaves.iter() {
        let points = leaf.iter().map(|&i| atomic_grid.points[i]).collect_vec();
        let weights = leaf.iter().map(|&i| atomic_grid.weights[i]).collect_vec();
        let task = build_task(
            parent,
            dist_nearest,
            offset,
            points,
            weights,
            basis,
            params.pv,
        )?;
        if task.screening.is_empty() && params.prune_empty {
            pruned.push(task.range);
        } else {
            tasks.push(task);
        }
        offset += leaf.len();
    }
    Ok(AtomPartition {
        tasks,
        pruned,
        order: leaves.into_iter().flatten().collect_vec(),
    })
}

/// Joins per-atom partitions, in atom order, into a single task set.
///
/// # Arguments
///
/// * `atom_partitions` - The partitions of every atomic grid, in atom order.
/// * `grid` - The molecular grid that was partitioned.
/// * `pv` - The padding factor.
pub(crate) fn assemble(
    atom_partitions: Vec<AtomPartition>,
    grid: &MolecularGrid,
    pv: usize,
) -> TaskSet {
    let mut tasks = vec![];
    let mut pruned = vec![];
    let mut permutation = Vec::with_capacity(grid.n_points());
    let mut atom_base = 0;
    for (atom_partition, atomic_grid) in atom_partitions.into_iter().zip(grid.atomic_grids()) {
        let shift = |range: PointRange| PointRange {
            offset: range.offset + atom_base,
            len: range.len,
        };
        tasks.extend(atom_partition.tasks.into_iter().map(|mut task| {
            task.range = shift(task.range);
            task
        }));
        pruned.extend(atom_partition.pruned.into_iter().map(shift));
        permutation.extend(atom_partition.order.iter().map(|&i| atom_base + i));
        atom_base += atomic_grid.n_points();
    }
    let task_set = TaskSet {
        pv,
        tasks,
        pruned,
        permutation,
    };
    log::debug!(
        "Partitioned {} grid points into {} tasks ({} pruned batches).",
        task_set.n_points(),
        task_set.n_tasks(),
        task_set.pruned.len()
    );
    task_set
}

/// Partitions a molecular grid into tasks, one atom after the other.
///
/// # Arguments
///
/// * `grid` - The molecular grid.
/// * `dist_nearest` - The nearest-neighbour distance of every atom.
/// * `basis` - The basis set to screen against.
/// * `params` - The partitioning parameters.
pub fn partition(
    grid: &MolecularGrid,
    dist_nearest: &[f64],
    basis: &BasisSet,
    params: &PartitionParams,
) -> Result<TaskSet, XcTaskError> {
    params.validate()?;
    check_atom_count(grid, dist_nearest)?;
    let atom_partitions = grid
        .atomic_grids()
        .iter()
        .zip(dist_nearest.iter())
        .enumerate()
        .map(|(iatom, (atomic_grid, dist))| {
            partition_atom(iatom, atomic_grid, *dist, basis, params)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assemble(atom_partitions, grid, params.pv))
}

/// Checks that every atomic grid has a nearest-neighbour distance.
pub(crate) fn check_atom_count(
    grid: &MolecularGrid,
    dist_nearest: &[f64],
) -> Result<(), XcTaskError> {
    if grid.n_atoms() != dist_nearest.len() {
        return Err(XcTaskError::Configuration(format!(
            "{} atomic grids but {} nearest-neighbour distances",
            grid.n_atoms(),
            dist_nearest.len()
        )));
    }
    Ok(())
}
